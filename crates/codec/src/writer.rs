//! Minimal big-endian binary writer for the token wire format.

#[derive(Default)]
pub(crate) struct Writer {
  buf: Vec<u8>,
}

impl Writer {
  pub(crate) fn new() -> Self {
    return Self { buf: Vec::new() };
  }

  pub(crate) fn u8(&mut self, v: u8) -> &mut Self {
    self.buf.push(v);
    return self;
  }

  pub(crate) fn u32(&mut self, v: u32) -> &mut Self {
    self.buf.extend_from_slice(&v.to_be_bytes());
    return self;
  }

  pub(crate) fn u64(&mut self, v: u64) -> &mut Self {
    self.buf.extend_from_slice(&v.to_be_bytes());
    return self;
  }

  pub(crate) fn i64(&mut self, v: i64) -> &mut Self {
    return self.u64(v as u64);
  }

  pub(crate) fn bytes(&mut self, v: &[u8]) -> &mut Self {
    self.buf.extend_from_slice(v);
    return self;
  }

  /// Writes a length-prefixed byte string: `len:4 | bytes:len`.
  pub(crate) fn len_prefixed(&mut self, v: &[u8]) -> &mut Self {
    self.u32(v.len() as u32);
    self.bytes(v);
    return self;
  }

  pub(crate) fn into_bytes(self) -> Vec<u8> {
    return self.buf;
  }
}
