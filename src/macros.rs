macro_rules! cbor_try_map {
    (
        $v:expr
    ) => {{
        match $v {
            serde_cbor::Value::Map(m) => Ok(m),
            _ => Err(()),
        }
    }};
}

macro_rules! cbor_try_array {
    (
        $v:expr
    ) => {{
        match $v {
            serde_cbor::Value::Array(m) => Ok(m),
            _ => Err(()),
        }
    }};
}

macro_rules! cbor_try_string {
    (
        $v:expr
    ) => {{
        match $v {
            serde_cbor::Value::Text(m) => Ok(m),
            _ => Err(()),
        }
    }};
}

macro_rules! cbor_try_bytes {
    (
        $v:expr
    ) => {{
        match $v {
            serde_cbor::Value::Bytes(m) => Ok(m),
            _ => Err(()),
        }
    }};
}

macro_rules! cbor_try_i128 {
    (
        $v:expr
    ) => {{
        match $v {
            serde_cbor::Value::Integer(m) => Ok(*m),
            _ => Err(()),
        }
    }};
}
