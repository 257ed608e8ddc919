use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};

/// One step of the sequence: which photo to load and which elevation slice to draw on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIndexPair {
    pub image_index: usize,
    pub data_index: usize,
}

/// Independent start/stop/step for photo frames and elevation data.
///
/// Image indices cover `[first_image, last_image)` with stride `step_image`.
/// The data index starts at `first_data` and advances by `step_data` once per
/// produced pair, whatever `step_image` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSequencer {
    pub first_image: usize,
    pub last_image: usize,
    pub step_image: usize,
    pub first_data: usize,
    pub step_data: usize,
}

impl FrameSequencer {
    pub fn new(
        first_image: usize,
        last_image: usize,
        step_image: usize,
        first_data: usize,
        step_data: usize,
    ) -> Result<FrameSequencer> {
        if step_image == 0 {
            return Err(OverlayError::config("image step must be at least 1"));
        }
        Ok(FrameSequencer {
            first_image,
            last_image,
            step_image,
            first_data,
            step_data,
        })
    }

    /// Number of pairs the sequence yields.
    pub fn len(&self) -> usize {
        if self.last_image <= self.first_image {
            0
        } else {
            (self.last_image - self.first_image).div_ceil(self.step_image)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fresh cursor over the pairs; can be called any number of times.
    pub fn iter(&self) -> FrameIter {
        FrameIter {
            seq: *self,
            k: 0,
            len: self.len(),
        }
    }
}

impl IntoIterator for &FrameSequencer {
    type Item = FrameIndexPair;
    type IntoIter = FrameIter;

    fn into_iter(self) -> FrameIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct FrameIter {
    seq: FrameSequencer,
    k: usize,
    len: usize,
}

impl Iterator for FrameIter {
    type Item = FrameIndexPair;

    fn next(&mut self) -> Option<FrameIndexPair> {
        if self.k >= self.len {
            return None;
        }
        // computed from k; no index steps past the last pair
        let pair = FrameIndexPair {
            image_index: self.seq.first_image + self.k * self.seq.step_image,
            data_index: self.seq.first_data + self.k * self.seq.step_data,
        };
        self.k += 1;
        Some(pair)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.k;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrameIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_handles_uneven_stride() {
        assert_eq!(FrameSequencer::new(0, 10, 3, 0, 1).unwrap().len(), 4);
        assert_eq!(FrameSequencer::new(5, 5, 1, 0, 1).unwrap().len(), 0);
        assert_eq!(FrameSequencer::new(7, 2, 1, 0, 1).unwrap().len(), 0);
    }

    #[test]
    fn last_pair_at_index_limit() {
        let pairs: Vec<_> = FrameSequencer::new(0, 1, 1, usize::MAX, 1).unwrap().iter().collect();
        assert_eq!(
            pairs,
            vec![FrameIndexPair {
                image_index: 0,
                data_index: usize::MAX
            }]
        );
        let seq = FrameSequencer::new(usize::MAX - 3, usize::MAX, 2, 0, 1).unwrap();
        assert_eq!(seq.iter().map(|p| p.image_index).collect::<Vec<_>>(), vec![usize::MAX - 3, usize::MAX - 1]);
    }

    #[test]
    fn zero_step_rejected() {
        assert!(FrameSequencer::new(0, 10, 0, 0, 1).is_err());
    }
}
