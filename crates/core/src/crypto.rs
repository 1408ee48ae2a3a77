use rand::RngCore;

/// `byte_len` bytes from the thread-local CSPRNG, hex encoded.
pub fn random_hex(byte_len: usize) -> String {
    let mut bytes = vec![0_u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    encode_hex(&bytes)
}

pub fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{encode_hex, random_hex};

    #[test]
    fn hex_encoding_is_lowercase_and_zero_padded() {
        assert_eq!(encode_hex(&[0, 15, 255]), "000fff");
    }

    #[test]
    fn random_hex_has_requested_entropy_and_differs_per_call() {
        let first = random_hex(32);
        let second = random_hex(32);
        assert_eq!(first.len(), 64);
        assert_ne!(first, second);
    }
}
