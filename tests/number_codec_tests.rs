use bitcoin_script_vm::{read_scriptint, scriptint_vec};

#[test]
fn roundtrips_across_representative_values() {
    for n in [0i64, 1, -1, 16, -16, 127, -127, 128, -128, 32767, -32767, 1_000_000, -1_000_000] {
        let encoded = scriptint_vec(n);
        let decoded = read_scriptint(&encoded, 4, true).unwrap();
        assert_eq!(decoded, n);
    }
}

#[test]
fn zero_encodes_to_empty_bytes() {
    assert!(scriptint_vec(0).is_empty());
    assert_eq!(read_scriptint(&[], 4, true).unwrap(), 0);
}

#[test]
fn decode_rejects_oversized_input() {
    let five_bytes = [1u8, 2, 3, 4, 5];
    assert!(read_scriptint(&five_bytes, 4, true).is_err());
}

#[test]
fn decode_rejects_non_minimal_encoding_when_required() {
    // 5 encoded with a redundant trailing zero byte.
    let non_minimal = [0x05u8, 0x00];
    assert!(read_scriptint(&non_minimal, 4, true).is_err());
    assert!(read_scriptint(&non_minimal, 4, false).is_ok());
}

#[test]
fn sign_boundary_needs_extra_byte() {
    assert_eq!(read_scriptint(&[0xff, 0x00], 4, true).unwrap(), 255);
    assert_eq!(read_scriptint(&[0xff, 0x80], 4, true).unwrap(), -255);
}
