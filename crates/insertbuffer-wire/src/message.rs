//! Request and response messages.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{WireError, WireResult};
use crate::{DATABASE_LEN_SIZE, HEADER_SIZE, PROTOCOL_VERSION, RESPONSE_SIZE, RESULT_ACCEPTED};

/// Fixed-size request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Protocol version announced by the client.
    pub version: u32,
    /// Number of payload bytes that follow the header.
    pub payload_len: u32,
}

impl RequestHeader {
    /// Parses a header from exactly [`HEADER_SIZE`] bytes.
    pub fn parse(bytes: [u8; HEADER_SIZE]) -> Self {
        let mut src = &bytes[..];
        let version = src.get_u32_le();
        let payload_len = src.get_u32_le();
        Self {
            version,
            payload_len,
        }
    }

    /// Checks the version and the payload bound, returning the payload length.
    pub fn validate(&self, max_payload_size: usize) -> WireResult<usize> {
        if self.version != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(self.version));
        }

        let len = self.payload_len as usize;
        if len > max_payload_size {
            return Err(WireError::PayloadTooLarge {
                len,
                max: max_payload_size,
            });
        }

        Ok(len)
    }
}

/// A buffered-statement request: a database name plus the statement text.
///
/// Both parts are opaque bytes. Empty statements and embedded NUL bytes are
/// carried unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    database: Bytes,
    statement: Bytes,
}

impl Request {
    /// Creates a request for the given database and statement.
    pub fn new(database: impl Into<Bytes>, statement: impl Into<Bytes>) -> Self {
        Self {
            database: database.into(),
            statement: statement.into(),
        }
    }

    /// Returns the target database name.
    pub fn database(&self) -> &Bytes {
        &self.database
    }

    /// Returns the statement text.
    pub fn statement(&self) -> &Bytes {
        &self.statement
    }

    /// Splits the request into `(database, statement)`.
    pub fn into_parts(self) -> (Bytes, Bytes) {
        (self.database, self.statement)
    }

    /// Length of the encoded payload (everything after the header).
    pub fn payload_len(&self) -> usize {
        DATABASE_LEN_SIZE + self.database.len() + self.statement.len()
    }

    /// Encodes the full request (header and payload) into `buf`.
    ///
    /// Fails only when the payload does not fit the 32-bit length field.
    pub fn encode(&self, buf: &mut BytesMut) -> WireResult<()> {
        let len = self.payload_len();
        let payload_len = u32::try_from(len).map_err(|_| WireError::PayloadTooLarge {
            len,
            max: u32::MAX as usize,
        })?;

        buf.reserve(HEADER_SIZE + len);
        buf.put_u32_le(PROTOCOL_VERSION);
        buf.put_u32_le(payload_len);
        // Cannot truncate: the whole payload fits in a u32.
        buf.put_u32_le(self.database.len() as u32);
        buf.put_slice(&self.database);
        buf.put_slice(&self.statement);
        Ok(())
    }

    /// Encodes the full request into a fresh buffer.
    pub fn to_bytes(&self) -> WireResult<Bytes> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes a request from a complete payload.
    ///
    /// The database and statement share the payload allocation.
    pub fn decode_payload(mut payload: Bytes) -> WireResult<Self> {
        let payload_len = payload.len();
        if payload_len < DATABASE_LEN_SIZE {
            return Err(WireError::PayloadTooShort { len: payload_len });
        }

        let database_len = payload.get_u32_le() as usize;
        if database_len > payload.len() {
            return Err(WireError::DatabaseLengthOverflow {
                database_len,
                payload_len,
            });
        }

        let database = payload.split_to(database_len);
        Ok(Self {
            database,
            statement: payload,
        })
    }
}

/// Fixed-size response to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// Protocol version.
    pub version: u32,
    /// Result code.
    pub result: u32,
}

impl Response {
    /// The response sent once a statement has been buffered.
    pub fn accepted() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            result: RESULT_ACCEPTED,
        }
    }

    /// Returns true if the result code is [`RESULT_ACCEPTED`].
    pub fn is_accepted(&self) -> bool {
        self.result == RESULT_ACCEPTED
    }

    /// Encodes the response.
    pub fn encode(&self) -> [u8; RESPONSE_SIZE] {
        let mut out = [0u8; RESPONSE_SIZE];
        out[..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..].copy_from_slice(&self.result.to_le_bytes());
        out
    }

    /// Appends the encoded response to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.encode());
    }

    /// Decodes a response.
    ///
    /// The version is checked as soon as four bytes are present, so a peer
    /// speaking another version is reported as such even if it sent a short
    /// reply.
    pub fn decode(mut src: &[u8]) -> WireResult<Self> {
        let received = src.len();
        if received >= 4 {
            let version = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            if version != PROTOCOL_VERSION {
                return Err(WireError::UnsupportedVersion(version));
            }
        }
        if received < RESPONSE_SIZE {
            return Err(WireError::ResponseTooShort(received));
        }

        let version = src.get_u32_le();
        let result = src.get_u32_le();
        Ok(Self { version, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn encode_matches_documented_layout() {
        let request = Request::new("shop", "INSERT INTO t VALUES (1)");
        let bytes = request.to_bytes().unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&(4u32 + 4 + 24).to_le_bytes());
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.extend_from_slice(b"shop");
        expected.extend_from_slice(b"INSERT INTO t VALUES (1)");

        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn decode_payload_splits_database_and_statement() {
        let bytes = Request::new("shop", "DELETE FROM t").to_bytes().unwrap();
        let request = Request::decode_payload(bytes.slice(HEADER_SIZE..)).unwrap();

        assert_eq!(&request.database()[..], b"shop");
        assert_eq!(&request.statement()[..], b"DELETE FROM t");
    }

    #[test]
    fn decode_payload_rejects_short_payload() {
        let err = Request::decode_payload(Bytes::from_static(&[1, 0])).unwrap_err();
        assert_eq!(err, WireError::PayloadTooShort { len: 2 });
    }

    #[test]
    fn decode_payload_rejects_database_overflow() {
        let mut payload = BytesMut::new();
        payload.put_u32_le(10);
        payload.put_slice(b"abc");

        let err = Request::decode_payload(payload.freeze()).unwrap_err();
        assert_eq!(
            err,
            WireError::DatabaseLengthOverflow {
                database_len: 10,
                payload_len: 7,
            }
        );
    }

    #[test]
    fn header_validation() {
        let header = RequestHeader {
            version: 1,
            payload_len: 12,
        };
        assert_eq!(header.validate(1024), Ok(12));

        let header = RequestHeader {
            version: 2,
            payload_len: 12,
        };
        assert_eq!(header.validate(1024), Err(WireError::UnsupportedVersion(2)));

        let header = RequestHeader {
            version: 1,
            payload_len: 2048,
        };
        assert_eq!(
            header.validate(1024),
            Err(WireError::PayloadTooLarge {
                len: 2048,
                max: 1024,
            })
        );
    }

    #[test]
    fn accepted_response_bytes() {
        assert_eq!(Response::accepted().encode(), [1, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test_case(&[1, 0, 0, 0, 1, 0, 0, 0], Ok(Response::accepted()); "accepted")]
    #[test_case(&[2, 0, 0, 0, 1, 0, 0, 0], Err(WireError::UnsupportedVersion(2)); "wrong version")]
    #[test_case(&[2, 0, 0, 0], Err(WireError::UnsupportedVersion(2)); "short with wrong version")]
    #[test_case(&[1, 0, 0, 0, 1], Err(WireError::ResponseTooShort(5)); "short")]
    #[test_case(&[], Err(WireError::ResponseTooShort(0)); "empty")]
    fn response_decoding(bytes: &[u8], expected: WireResult<Response>) {
        assert_eq!(Response::decode(bytes), expected);
    }

    #[test]
    fn response_with_other_result_is_not_accepted() {
        let response = Response::decode(&[1, 0, 0, 0, 7, 0, 0, 0]).unwrap();
        assert!(!response.is_accepted());
    }

    proptest! {
        /// Any database name and statement survive encoding byte-for-byte.
        #[test]
        fn prop_request_roundtrip(
            database in proptest::collection::vec(any::<u8>(), 0..64),
            statement in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let request = Request::new(database.clone(), statement.clone());
            let bytes = request.to_bytes().unwrap();

            let header = RequestHeader::parse(bytes[..HEADER_SIZE].try_into().unwrap());
            prop_assert_eq!(header.validate(usize::MAX).unwrap(), bytes.len() - HEADER_SIZE);

            let decoded = Request::decode_payload(bytes.slice(HEADER_SIZE..)).unwrap();
            prop_assert_eq!(&decoded.database()[..], &database[..]);
            prop_assert_eq!(&decoded.statement()[..], &statement[..]);
        }
    }
}
