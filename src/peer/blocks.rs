use crate::message::Block;

/// Splits one piece into requests of `block_size` bytes. Offsets advance by the full block size,
/// so only the final block may be shorter.
pub struct Blocks {
    block_size: usize,
    piece: usize,
    offset: usize,
    end: usize,
}

impl Blocks {
    pub fn new(piece: usize, piece_size: usize, block_size: usize) -> Self {
        Self {
            block_size,
            piece,
            offset: 0,
            end: piece_size,
        }
    }

    pub fn total(piece_size: usize, block_size: usize) -> usize {
        piece_size.div_ceil(block_size)
    }
}

impl Iterator for Blocks {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset < self.end {
            let block_size = self.block_size.min(self.end - self.offset);
            let block = Block::new(self.piece, self.offset, block_size);
            self.offset += self.block_size;
            Some(block)
        } else {
            None
        }
    }
}
