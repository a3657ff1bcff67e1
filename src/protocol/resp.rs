use bytes::Bytes;

const CRLF: &[u8] = b"\r\n";
const NULL_BULK: &[u8] = b"$-1\r\n";
const NULL_ARRAY: &[u8] = b"*-1\r\n";

/// One RESP value, as decoded from a peer or sent back as a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    SimpleString(String),
    Integer(i64),
    Error(String),
    /// `None` is the null bulk string
    BulkString(Option<Bytes>),
    /// `None` is the null array; `Some(vec![])` is the empty array
    Array(Option<Vec<Option<Bytes>>>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::SimpleString("OK".to_string())
    }

    pub fn null() -> Self {
        Reply::BulkString(None)
    }

    pub fn empty_array() -> Self {
        Reply::Array(Some(Vec::new()))
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::BulkString(Some(data.into()))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    /// Encode into a freshly allocated buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len_hint());
        self.write_to(&mut buf);
        buf
    }

    /// Append the wire encoding to `buf`
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(e) => {
                buf.push(b'-');
                buf.extend_from_slice(e.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.push(b':');
                let mut num_buf = itoa::Buffer::new();
                buf.extend_from_slice(num_buf.format(*n).as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::BulkString(data) => write_bulk(buf, data.as_deref()),
            Reply::Array(Some(items)) => {
                buf.push(b'*');
                let mut num_buf = itoa::Buffer::new();
                buf.extend_from_slice(num_buf.format(items.len()).as_bytes());
                buf.extend_from_slice(CRLF);
                for item in items {
                    write_bulk(buf, item.as_deref());
                }
            }
            Reply::Array(None) => buf.extend_from_slice(NULL_ARRAY),
        }
    }

    /// Estimate the encoded size (for pre-allocation)
    #[inline]
    fn encoded_len_hint(&self) -> usize {
        match self {
            Reply::SimpleString(s) => s.len() + 3,
            Reply::Error(e) => e.len() + 3,
            Reply::Integer(_) => 24,
            Reply::BulkString(Some(b)) => b.len() + 16,
            Reply::BulkString(None) | Reply::Array(None) => 5,
            Reply::Array(Some(items)) => {
                16 + items
                    .iter()
                    .map(|item| item.as_ref().map_or(5, |b| b.len() + 16))
                    .sum::<usize>()
            }
        }
    }
}

#[inline]
fn write_bulk(buf: &mut Vec<u8>, data: Option<&[u8]>) {
    match data {
        Some(data) => {
            buf.push(b'$');
            let mut num_buf = itoa::Buffer::new();
            buf.extend_from_slice(num_buf.format(data.len()).as_bytes());
            buf.extend_from_slice(CRLF);
            buf.extend_from_slice(data);
            buf.extend_from_slice(CRLF);
        }
        None => buf.extend_from_slice(NULL_BULK),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_simple_string() {
        assert_eq!(Reply::ok().to_bytes(), b"+OK\r\n");
        assert_eq!(Reply::SimpleString(String::new()).to_bytes(), b"+\r\n");
    }

    #[test]
    fn test_encode_integer() {
        assert_eq!(Reply::Integer(42).to_bytes(), b":42\r\n");
        assert_eq!(Reply::Integer(-7).to_bytes(), b":-7\r\n");
        assert_eq!(
            Reply::Integer(i64::MIN).to_bytes(),
            b":-9223372036854775808\r\n"
        );
    }

    #[test]
    fn test_encode_error() {
        assert_eq!(
            Reply::error("ERR unknown").to_bytes(),
            b"-ERR unknown\r\n"
        );
    }

    #[test]
    fn test_encode_bulk() {
        assert_eq!(Reply::bulk("foobar").to_bytes(), b"$6\r\nfoobar\r\n");
        assert_eq!(Reply::bulk("").to_bytes(), b"$0\r\n\r\n");
        assert_eq!(Reply::null().to_bytes(), b"$-1\r\n");
    }

    #[test]
    fn test_encode_array() {
        let reply = Reply::Array(Some(vec![
            Some(Bytes::from_static(b"foo")),
            None,
            Some(Bytes::from_static(b"bar")),
        ]));
        assert_eq!(
            reply.to_bytes(),
            b"*3\r\n$3\r\nfoo\r\n$-1\r\n$3\r\nbar\r\n".to_vec()
        );
    }

    #[test]
    fn test_encode_empty_and_null_array() {
        assert_eq!(Reply::empty_array().to_bytes(), b"*0\r\n");
        assert_eq!(Reply::Array(None).to_bytes(), b"*-1\r\n");
    }

    #[test]
    fn test_write_to_appends() {
        let mut buf = b"prefix".to_vec();
        Reply::Integer(1).write_to(&mut buf);
        Reply::ok().write_to(&mut buf);
        assert_eq!(buf, b"prefix:1\r\n+OK\r\n");
    }
}
