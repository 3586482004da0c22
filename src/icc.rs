//! Reassembly of ICC profiles split across multiple APP2 segments.
//!
//! Each `ICC_PROFILE` APP2 payload starts with a 1-based chunk sequence
//! number and the total chunk count. The count is fixed by the first chunk
//! seen; every chunk must agree with it and fill a distinct slot.

use crate::error::{Error, ErrorKind, Result};

#[derive(Debug)]
pub(crate) struct IccAssembler {
    chunks: Vec<Option<Vec<u8>>>,
    seen: usize,
}

impl IccAssembler {
    pub fn new(chunk_count: u8) -> Result<Self> {
        if chunk_count == 0 {
            return Err(Error::new(ErrorKind::IccError, "icc chunk count is zero"));
        }
        Ok(Self {
            chunks: vec![None; usize::from(chunk_count)],
            seen: 0,
        })
    }

    pub fn add_chunk(&mut self, sequence: u8, chunk_count: u8, payload: &[u8]) -> Result<()> {
        if usize::from(chunk_count) != self.chunks.len() {
            return Err(Error::new(
                ErrorKind::IccError,
                "icc chunks disagree on the total chunk count",
            ));
        }
        if sequence == 0 {
            return Err(Error::new(
                ErrorKind::IccError,
                "icc chunk sequence numbers are 1-based",
            ));
        }
        if payload.is_empty() {
            return Err(Error::new(ErrorKind::IccError, "empty icc chunk"));
        }
        let index = usize::from(sequence) - 1;
        let slot = self.chunks.get_mut(index).ok_or_else(|| {
            Error::new(
                ErrorKind::IccError,
                "icc chunk sequence number exceeds the chunk count",
            )
        })?;
        if slot.is_some() {
            return Err(Error::new(
                ErrorKind::IccError,
                "duplicate icc chunk sequence number",
            ));
        }
        *slot = Some(payload.to_vec());
        self.seen += 1;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.seen == self.chunks.len()
    }

    /// Concatenates the chunk payloads in sequence order. Only meaningful
    /// once [`IccAssembler::is_complete`] reports true.
    pub fn assemble(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for chunk in &self.chunks {
            data.extend_from_slice(chunk.as_deref().unwrap_or_default());
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk() {
        let mut icc = IccAssembler::new(1).unwrap();
        icc.add_chunk(1, 1, b"profile").unwrap();
        assert!(icc.is_complete());
        assert_eq!(icc.assemble(), b"profile");
    }

    #[test]
    fn chunks_arrive_out_of_order() {
        let mut icc = IccAssembler::new(3).unwrap();
        icc.add_chunk(2, 3, b"bb").unwrap();
        assert!(!icc.is_complete());
        icc.add_chunk(3, 3, b"cc").unwrap();
        icc.add_chunk(1, 3, b"aa").unwrap();
        assert!(icc.is_complete());
        assert_eq!(icc.assemble(), b"aabbcc");
    }

    #[test]
    fn inconsistencies_are_rejected() {
        assert_eq!(IccAssembler::new(0).unwrap_err().kind(), ErrorKind::IccError);

        let mut icc = IccAssembler::new(2).unwrap();
        assert!(icc.add_chunk(1, 3, b"x").is_err()); // count disagreement
        assert!(icc.add_chunk(0, 2, b"x").is_err()); // 0-based sequence
        assert!(icc.add_chunk(3, 2, b"x").is_err()); // beyond the count
        assert!(icc.add_chunk(1, 2, b"").is_err()); // no payload
        icc.add_chunk(1, 2, b"x").unwrap();
        assert!(icc.add_chunk(1, 2, b"y").is_err()); // duplicate slot
    }
}
