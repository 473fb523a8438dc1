/// Bit 15 of the length field marks a continuation chunk
pub const CONTINUATION_FLAG: u16 = 0x8000;

/// First two bytes of every chunk, little-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthField {
    /// Total packet size including the header
    pub cargo_len: u16,
    pub continuation: bool,
}

impl LengthField {
    /// Returns `None` if fewer than two bytes are available
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let raw = u16::from_le_bytes([*buf.first()?, *buf.get(1)?]);
        Some(Self {
            cargo_len: raw & !CONTINUATION_FLAG,
            continuation: raw & CONTINUATION_FLAG != 0,
        })
    }
}

/// Read-length bookkeeping for the dynamic-length read protocol
#[derive(Debug, Clone, Copy)]
pub struct ReadPlan {
    pub header_len: usize,
    pub max_transfer: usize,
}

impl ReadPlan {
    /// Always at least a header, never more than one transfer
    pub fn read_len(&self, pending: usize) -> usize {
        pending.max(self.header_len).min(self.max_transfer)
    }

    /// Bytes owed after reading `read_len` bytes of a packet of `cargo_len`.
    ///
    /// A continuation re-sends its header, so the header size is added back
    /// on top of the cargo still outstanding. Kept within one transfer's
    /// worth of cargo; the device re-offers whatever is left.
    pub fn pending_after(&self, cargo_len: usize, read_len: usize) -> usize {
        if cargo_len > read_len {
            ((cargo_len - read_len) + self.header_len).min(self.max_transfer - self.header_len)
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: ReadPlan = ReadPlan {
        header_len: 4,
        max_transfer: 384,
    };

    #[test]
    fn test_length_field_masks_continuation() {
        let field = LengthField::parse(&[0x06, 0x80, 0x01, 0x00]).unwrap();
        assert_eq!(field.cargo_len, 6);
        assert!(field.continuation);

        let field = LengthField::parse(&[0x2C, 0x01]).unwrap();
        assert_eq!(field.cargo_len, 300);
        assert!(!field.continuation);

        assert_eq!(LengthField::parse(&[0x06]), None);
    }

    #[test]
    fn test_read_len_bounds() {
        assert_eq!(PLAN.read_len(0), 4);
        assert_eq!(PLAN.read_len(2), 4);
        assert_eq!(PLAN.read_len(100), 100);
        assert_eq!(PLAN.read_len(1000), 384);
    }

    #[test]
    fn test_pending_after_header_only_read() {
        // cargo 6 seen through a 4-byte header read: 2 bytes of cargo plus a fresh header
        assert_eq!(PLAN.pending_after(6, 4), 6);
        assert_eq!(PLAN.pending_after(4, 4), 0);
        assert_eq!(PLAN.pending_after(3, 4), 0);
    }

    #[test]
    fn test_pending_stays_within_buffer() {
        assert_eq!(PLAN.pending_after(2000, 4), 380);
        assert_eq!(PLAN.pending_after(300, 4), 300);
    }
}
