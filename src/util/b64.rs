use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;

/// Encode raw bytes into a standard base64 string.
///
/// Used for the default proof-of-payment header encoding, where the header
/// value is the base64 of the textual transaction hash.
pub fn encode<T: AsRef<[u8]>>(input: T) -> String {
    b64.encode(input.as_ref())
}

/// Decode a standard base64 string back into raw bytes.
pub fn decode<T: AsRef<[u8]>>(input: T) -> Result<Vec<u8>, base64::DecodeError> {
    b64.decode(input.as_ref())
}
