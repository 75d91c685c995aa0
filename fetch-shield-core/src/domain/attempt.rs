use crate::error::TransportError;

/// One iteration of a retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Zero-based position within the attempt sequence.
    pub sequence_number: usize,
    /// Set by [`Attempt::failed`] once the attempt has failed.
    pub error: Option<TransportError>,
}

impl Attempt {
    pub fn new(sequence_number: usize) -> Self {
        Self {
            sequence_number,
            error: None,
        }
    }

    pub fn failed(mut self, error: TransportError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn is_first(&self) -> bool {
        self.sequence_number == 0
    }
}
