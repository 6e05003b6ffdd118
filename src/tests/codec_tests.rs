// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::codec::{CodedBuffer, CodedInputStream};

#[test]
fn integer_boundaries_survive_encoding() {
    let unsigned32 = [0u32, 1, 127, 128, 16_383, 16_384, u32::MAX - 1, u32::MAX];
    let signed32 = [0i32, -1, 1, -64, 64, i32::MIN, i32::MAX];
    let unsigned64 = [0u64, 1, u32::MAX as u64 + 1, u64::MAX];
    let signed64 = [0i64, -1, 1, i64::MIN, i64::MAX, i32::MIN as i64 - 1];

    let mut buf = CodedBuffer::new();
    unsigned32.iter().for_each(|v| buf.write_int(*v));
    signed32.iter().for_each(|v| buf.write_sint(*v));
    unsigned64.iter().for_each(|v| buf.write_long(*v));
    signed64.iter().for_each(|v| buf.write_slong(*v));

    let mut input = CodedInputStream::new(buf.as_bytes());
    for v in unsigned32 {
        assert_eq!(input.read_int().unwrap(), v);
    }
    for v in signed32 {
        assert_eq!(input.read_sint().unwrap(), v);
    }
    for v in unsigned64 {
        assert_eq!(input.read_long().unwrap(), v);
    }
    for v in signed64 {
        assert_eq!(input.read_slong().unwrap(), v);
    }
    assert!(input.is_at_end().unwrap());
}

#[test]
fn doubles_keep_their_bits() {
    let values = [0.0f64, -0.0, 1.5, -2.25e-300, f64::MAX, f64::MIN_POSITIVE, f64::INFINITY, f64::NAN];
    let mut buf = CodedBuffer::new();
    values.iter().for_each(|v| buf.write_double(*v));
    assert_eq!(buf.len(), values.len() * 8);

    let mut input = CodedInputStream::new(buf.as_bytes());
    for v in values {
        assert_eq!(input.read_double().unwrap().to_bits(), v.to_bits());
    }
}

#[test]
fn extreme_varints_use_maximal_width() {
    let mut buf = CodedBuffer::new();
    buf.write_int(u32::MAX);
    assert_eq!(buf.len(), 5);
    buf.clear();
    buf.write_long(u64::MAX);
    assert_eq!(buf.len(), 10);
    buf.clear();
    buf.write_slong(i64::MIN);
    assert_eq!(buf.len(), 10);
}

#[test]
fn bytes_and_strings() {
    let mut buf = CodedBuffer::new();
    buf.write_byte(0xAB);
    buf.write_bytes(&[]);
    buf.write_bytes(&[1, 2, 3]);
    buf.write_string("présence");

    let mut input = CodedInputStream::new(buf.as_bytes());
    assert_eq!(input.read_byte().unwrap(), 0xAB);
    assert!(input.read_bytes().unwrap().is_empty());
    assert_eq!(input.read_bytes().unwrap(), vec![1, 2, 3]);
    assert_eq!(input.read_string().unwrap(), "présence");
}
