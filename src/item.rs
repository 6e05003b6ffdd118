// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Values that can be stored in a trace.

use crate::codec::{CodedBuffer, CodedInputStream};
use crate::error::Result;
use std::io::BufRead;

/// A value that serializes itself through the codec.
///
/// `read_from` plays the role of the item factory: every trace is typed by
/// the `Item` it stores, and decoding is resolved at compile time.
pub trait Item: Sized {
    fn write_to(&self, out: &mut CodedBuffer);

    fn read_from<R: BufRead>(input: &mut CodedInputStream<R>) -> Result<Self>;
}

impl Item for u32 {
    fn write_to(&self, out: &mut CodedBuffer) {
        out.write_int(*self);
    }

    fn read_from<R: BufRead>(input: &mut CodedInputStream<R>) -> Result<Self> {
        input.read_int()
    }
}

impl Item for i64 {
    fn write_to(&self, out: &mut CodedBuffer) {
        out.write_slong(*self);
    }

    fn read_from<R: BufRead>(input: &mut CodedInputStream<R>) -> Result<Self> {
        input.read_slong()
    }
}

impl Item for String {
    fn write_to(&self, out: &mut CodedBuffer) {
        out.write_string(self);
    }

    fn read_from<R: BufRead>(input: &mut CodedInputStream<R>) -> Result<Self> {
        input.read_string()
    }
}
