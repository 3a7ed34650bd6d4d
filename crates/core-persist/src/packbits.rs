//! PackBits byte compression.
//!
//! Output is a sequence of (header, payload) pairs. For header `n` read as
//! a signed byte: `0 ≤ n ≤ 127` introduces `n + 1` literal bytes;
//! `-127 ≤ n ≤ -1` repeats the next byte `1 - n` times (2 to 128);
//! `-128` is a no-op and skipped.
//!
//! The encoder turns every stretch of two or more identical bytes into a
//! run and bounds both runs and literal blocks at 128 bytes, so a literal
//! block always breaks where a run begins.

use crate::PersistError;

pub fn encode(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() / 2 + 8);
    let mut i = 0;
    while i < src.len() {
        let byte = src[i];
        let mut run = 1;
        while run < 128 && i + run < src.len() && src[i + run] == byte {
            run += 1;
        }
        if run >= 2 {
            out.push((1i16 - run as i16) as u8);
            out.push(byte);
            i += run;
        } else {
            let start = i;
            i += 1;
            while i < src.len() && i - start < 128 {
                if i + 1 < src.len() && src[i] == src[i + 1] {
                    break;
                }
                i += 1;
            }
            let literal = &src[start..i];
            out.push((literal.len() - 1) as u8);
            out.extend_from_slice(literal);
        }
    }
    out
}

pub fn decode(src: &[u8]) -> Result<Vec<u8>, PersistError> {
    let mut out = Vec::with_capacity(src.len() * 2);
    let mut i = 0;
    while i < src.len() {
        let header = src[i] as i8;
        i += 1;
        match header {
            -128 => {}
            h if h >= 0 => {
                let n = h as usize + 1;
                let literal = src.get(i..i + n).ok_or(PersistError::TruncatedRle)?;
                out.extend_from_slice(literal);
                i += n;
            }
            h => {
                let n = (1 - h as i32) as usize;
                let byte = *src.get(i).ok_or(PersistError::TruncatedRle)?;
                out.resize(out.len() + n, byte);
                i += 1;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn golden_vector() {
        // Run of five, literal of three, run of two, run of four.
        let input = [7u8, 7, 7, 7, 7, 1, 2, 3, 7, 7, 8, 8, 8, 8];
        let encoded = encode(&input);
        assert_eq!(
            encoded,
            vec![0xFC, 0x07, 0x02, 0x01, 0x02, 0x03, 0xFF, 0x07, 0xFD, 0x08]
        );
        assert_eq!(decode(&encoded).unwrap(), input.to_vec());
    }

    #[test]
    fn empty_input() {
        assert!(encode(&[]).is_empty());
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn single_byte_is_a_literal() {
        let encoded = encode(&[42]);
        assert_eq!(encoded, vec![0x00, 42]);
        assert_eq!(decode(&encoded).unwrap(), vec![42]);
    }

    #[test]
    fn long_runs_split_at_128() {
        let input = vec![5u8; 300];
        let encoded = encode(&input);
        // 300 = 128 + 128 + 44; three run pairs.
        assert_eq!(encoded.len(), 6);
        assert_eq!(encoded[0], 0x81); // 1 - 128
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn long_literals_split_at_128() {
        // 0..=255 has no repeated neighbors, so it is pure literal data.
        let input: Vec<u8> = (0u8..=255).collect();
        let encoded = encode(&input);
        assert_eq!(encoded[0], 127); // first literal block of 128
        assert_eq!(encoded.len(), 256 + 2);
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn noop_header_is_skipped() {
        let encoded = [0x80u8, 0x00, 42];
        assert_eq!(decode(&encoded).unwrap(), vec![42]);
    }

    #[test]
    fn truncated_literal_is_an_error() {
        assert!(matches!(
            decode(&[0x05, 1, 2]),
            Err(PersistError::TruncatedRle)
        ));
    }

    #[test]
    fn truncated_run_is_an_error() {
        assert!(matches!(decode(&[0xFE]), Err(PersistError::TruncatedRle)));
    }

    #[test]
    fn uniform_layer_compresses_hard() {
        let input = vec![255u8; 4096];
        let encoded = encode(&input);
        assert!(encoded.len() <= input.len() / 64);
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    proptest! {
        #[test]
        fn round_trips_arbitrary_bytes(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let encoded = encode(&data);
            prop_assert_eq!(decode(&encoded).unwrap(), data);
        }

        #[test]
        fn runs_never_exceed_128(data in proptest::collection::vec(0u8..4, 0..2048)) {
            // Narrow alphabet provokes long runs; decode must still agree.
            let encoded = encode(&data);
            prop_assert_eq!(decode(&encoded).unwrap(), data);
        }
    }
}
