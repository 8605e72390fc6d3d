use bytes::{BufMut, Bytes, BytesMut};

/// A single parsed protocol value.
///
/// This enum covers the value types a client sees on the wire:
/// - SimpleString: status replies like "OK"
/// - Error: error replies from the server
/// - Integer: numeric replies
/// - BulkString: binary-safe payloads, possibly null
/// - Array: ordered replies and pushed messages, possibly null
///
/// Equality is structural: variant first, then payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer reply (`:1000`).
    Integer(i64),
    /// Simple string reply (`+OK`).
    SimpleString(String),
    /// Error reply (`-ERR ...`).
    Error(String),
    /// Bulk string reply (`$6\r\nfoobar`); `None` is the null bulk string
    /// (`$-1`).
    BulkString(Option<Bytes>),
    /// Array reply (`*2\r\n...`); `None` is the null array (`*-1`).
    Array(Option<Vec<Value>>),
}

impl Value {
    /// True if this value is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Integer payload, if this is an integer reply.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Bulk string payload, if this is a non-null bulk string.
    pub fn as_bulk_string(&self) -> Option<&Bytes> {
        match self {
            Value::BulkString(Some(data)) => Some(data),
            _ => None,
        }
    }

    /// Array elements, if this is a non-null array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(Some(items)) => Some(items),
            _ => None,
        }
    }

    /// Writes the wire encoding of this value into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Value::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Value::Error(e) => {
                buf.put_u8(b'-');
                buf.extend_from_slice(e.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Value::Integer(n) => {
                buf.put_u8(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Value::BulkString(Some(data)) => {
                buf.put_u8(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            Value::BulkString(None) => {
                buf.extend_from_slice(b"$-1\r\n");
            }
            Value::Array(Some(items)) => {
                buf.put_u8(b'*');
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode(buf);
                }
            }
            Value::Array(None) => {
                buf.extend_from_slice(b"*-1\r\n");
            }
        }
    }

    /// Returns the wire encoding of this value as a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_simple_string() {
        let value = Value::SimpleString("OK".to_string());
        assert_eq!(value.to_bytes().as_ref(), b"+OK\r\n");
    }

    #[test]
    fn test_encode_error() {
        let value = Value::Error("ERR".to_string());
        assert_eq!(value.to_bytes().as_ref(), b"-ERR\r\n");
    }

    #[test]
    fn test_encode_integer() {
        assert_eq!(Value::Integer(42).to_bytes().as_ref(), b":42\r\n");
        assert_eq!(Value::Integer(-7).to_bytes().as_ref(), b":-7\r\n");
    }

    #[test]
    fn test_encode_bulk_string() {
        let value = Value::BulkString(Some(Bytes::from("hello")));
        assert_eq!(value.to_bytes().as_ref(), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_encode_empty_bulk_string() {
        let value = Value::BulkString(Some(Bytes::new()));
        assert_eq!(value.to_bytes().as_ref(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_encode_null_bulk_string() {
        assert_eq!(Value::BulkString(None).to_bytes().as_ref(), b"$-1\r\n");
    }

    #[test]
    fn test_encode_array() {
        let value = Value::Array(Some(vec![
            Value::BulkString(Some(Bytes::from("foo"))),
            Value::BulkString(Some(Bytes::from("bar"))),
        ]));
        assert_eq!(value.to_bytes().as_ref(), b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
    }

    #[test]
    fn test_encode_null_array() {
        assert_eq!(Value::Array(None).to_bytes().as_ref(), b"*-1\r\n");
    }

    #[test]
    fn test_accessors() {
        assert!(Value::Error("ERR".to_string()).is_error());
        assert!(!Value::Integer(1).is_error());
        assert_eq!(Value::Integer(9).as_integer(), Some(9));
        assert_eq!(Value::SimpleString("x".to_string()).as_integer(), None);

        let data = Bytes::from("payload");
        assert_eq!(
            Value::BulkString(Some(data.clone())).as_bulk_string(),
            Some(&data)
        );
        assert_eq!(Value::BulkString(None).as_bulk_string(), None);

        let items = vec![Value::Integer(1), Value::Integer(2)];
        let array = Value::Array(Some(items.clone()));
        assert_eq!(array.as_array(), Some(items.as_slice()));
        assert_eq!(Value::Array(None).as_array(), None);
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::Array(Some(vec![
            Value::SimpleString("message".to_string()),
            Value::BulkString(None),
        ]));
        let b = Value::Array(Some(vec![
            Value::SimpleString("message".to_string()),
            Value::BulkString(None),
        ]));
        assert_eq!(a, b);
        assert_ne!(a, Value::Array(None));
    }
}
