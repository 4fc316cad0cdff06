use crate::jvm::code::SynLabel;
use crate::util::{Offset, OffsetVec, Width};
use std::collections::HashMap;

/// A method body is a linear sequence of basic blocks.
///
/// Alongside the instructions, each block records the frame at its entry. That frame is what
/// ultimately feeds the stack map table and what jump rewriting copies when it splits a block.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct BasicBlock<Frame, Insn, BrInsn> {
    /// Frame at the start of the block
    pub frame: Frame,

    /// Straight-line instructions in the block
    pub instructions: OffsetVec<Insn>,

    /// Branch instruction to close the block
    pub branch_end: BrInsn,
}

impl<Frame, Insn: Width, BrInsn: Width> Width for BasicBlock<Frame, Insn, BrInsn> {
    fn width(&self) -> usize {
        self.instructions.offset_len().0 + self.branch_end.width()
    }
}

impl<Frame, Insn: Width, BrInsn: Width> BasicBlock<Frame, Insn, BrInsn> {
    /// Given the placement order of blocks, compute the offset of every block from the start of
    /// the method.
    pub fn compute_block_offsets(
        block_layout_order: &[SynLabel],
        blocks: &HashMap<SynLabel, BasicBlock<Frame, Insn, BrInsn>>,
    ) -> HashMap<SynLabel, Offset> {
        let mut block_offsets: HashMap<SynLabel, Offset> = HashMap::new();
        let mut offset = Offset(0);
        for block_lbl in block_layout_order {
            block_offsets.insert(*block_lbl, offset);
            offset.0 += blocks[block_lbl].width();
        }
        block_offsets
    }
}
