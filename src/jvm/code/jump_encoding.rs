//! Upgrade jumps whose targets are out of range into `goto_w` forms
//!
//! Almost every JVM branch instruction encodes its target as a signed 16-bit offset. Methods can
//! be longer than that, so any jump found to span more than the 16-bit range has to be rewritten
//! in terms of `goto_w` (whose offset is a signed 32-bit value).
//!
//! ### Termination
//!
//! Each rewrite makes the code longer, which can push other jumps out of range, which forces more
//! rewrites. The process still terminates: the set of 16-bit jumps only ever shrinks, since
//!
//!   - a jump that has been rewritten never needs to be looked at again (`goto_w` reaches
//!     anywhere a method can be long), and
//!
//!   - the 16-bit jumps introduced by a rewrite target the immediately following blocks, so
//!     their offsets are small constants that no amount of later growth can affect.
//!
//! ### Rewrites
//!
//! Every rewrite must grow the code by a multiple of four bytes. Blocks further along may end in
//! `tableswitch`/`lookupswitch`, whose padding was fixed when the blocks were laid out; growth
//! in four-byte steps keeps that padding valid. An oversized `goto` becomes a padded `goto_w`
//! (+4 bytes):
//!
//! ```text,ignore,no_run
//!                           nop
//!                           nop
//!     goto L2               goto_w L2
//! L1: ...         =>    L1: ...
//! L2: ...               L2: ...
//! ```
//!
//! An oversized conditional jump gets its condition inverted and two short trampoline blocks
//! (+8 bytes):
//!
//! ```text,ignore,no_run
//!                           ifnot* L4
//!     if* L2            L3: goto L1
//! L1: ...               L4: goto_w L2
//!     ...         =>    L1: ...
//! L2: ...                   ...
//!                       L2: ...
//! ```

use crate::jvm::code::{BasicBlock, BranchInstruction, JumpTargets, LabelGenerator};
use crate::util::{Interval, Offset, OffsetVec, SegmentTree, Width};
use log::debug;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::{RangeBounds, RangeInclusive};

/// Range of relative offsets supported by `goto` and the `if*` instructions
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<isize> =
    RangeInclusive::new(i16::MIN as isize, i16::MAX as isize);

/// Find all of the jumps that don't fit in their 16-bit offsets and rewrite them.
///
/// Rewriting conditional jumps introduces new blocks, so the block order and the block map are
/// both taken by mutable reference. The `small_jump_range` parameter exists so tests can shrink
/// the threshold; real callers always pass [`SIGNED_16BIT_JUMP_RANGE`].
pub fn widen_oversized_jumps<Frame: Clone, Insn: Default + Width, Lbl: Copy + Eq + Hash + Debug>(
    block_order: &mut Vec<Lbl>,
    blocks: &mut HashMap<Lbl, BasicBlock<Frame, Insn, BranchInstruction<Lbl, Lbl, Lbl>>>,
    label_generator: &mut impl LabelGenerator<Lbl>,
    small_jump_range: &impl RangeBounds<isize>,
) {
    // Index of every block in the layout order, along with its current starting offset
    let mut block_index_and_offset: HashMap<Lbl, (usize, Offset)> = HashMap::new();
    let mut current_offset: usize = 0;
    for (idx, lbl) in block_order.iter().enumerate() {
        block_index_and_offset.insert(*lbl, (idx, Offset(current_offset)));
        current_offset += blocks[lbl].width();
    }

    // Every jump that uses a 16-bit offset, modelled as an interval in block-index space. The
    // endpoints are chosen so that an interval contains index `i` exactly when growth at the
    // seam before block `i` (or at the tail of block `i - 1`) stretches the jump.
    let mut rewritable_jumps: Vec<JumpInterval<Lbl>> = blocks
        .iter()
        .filter_map(|(block_lbl, block)| match block.branch_end.jump_targets() {
            JumpTargets::Regular(to_block_lbl) => {
                let (mut from_index, mut from_offset) = block_index_and_offset[block_lbl];
                from_index += 1;
                from_offset.0 += block.instructions.offset_len().0;
                let (to_index, to_offset) = block_index_and_offset[&to_block_lbl];
                let jump_distance = to_offset.0 as isize - from_offset.0 as isize;
                let (jump_range, is_forward) = if from_index <= to_index {
                    (RangeInclusive::new(from_index, to_index), true)
                } else {
                    (RangeInclusive::new(to_index, from_index), false)
                };
                Some(JumpInterval {
                    jump_from_block: *block_lbl,
                    jump_range,
                    is_goto: matches!(block.branch_end, BranchInstruction::Goto(_)),
                    is_forward,
                    jump_distance: Cell::new(jump_distance),
                })
            }
            _ => None,
        })
        .collect();

    // The map iteration above is unordered; sort so the rewrite output is reproducible
    rewritable_jumps
        .sort_unstable_by_key(|jump| (*jump.jump_range.start(), *jump.jump_range.end()));

    // Jumps already known to need the rewrite (most methods have none, so bail early)
    let mut oversized_jumps: Vec<&JumpInterval<Lbl>> = rewritable_jumps
        .iter()
        .filter(|jump| jump.is_oversized(small_jump_range))
        .collect();
    if oversized_jumps.is_empty() {
        return;
    }
    let mut known_oversized: HashSet<Lbl> = oversized_jumps
        .iter()
        .map(|jump| jump.jump_from_block)
        .collect();

    // Process oversized jumps to a fixpoint, tracking which other jumps each rewrite stretches
    let jump_tree = SegmentTree::new(rewritable_jumps.iter().collect());
    let mut widen_goto: HashSet<Lbl> = HashSet::new();
    let mut widen_branch: HashMap<Lbl, (Lbl, Lbl)> = HashMap::new();
    while let Some(oversized_jump) = oversized_jumps.pop() {
        debug!(
            "widening oversized jump from {:?} (distance {})",
            oversized_jump.jump_from_block,
            oversized_jump.jump_distance.get(),
        );

        // Record the pending rewrite
        let bytes_added_by_rewrite: isize = if oversized_jump.is_goto {
            widen_goto.insert(oversized_jump.jump_from_block);
            4
        } else {
            widen_branch.insert(
                oversized_jump.jump_from_block,
                (label_generator.fresh_label(), label_generator.fresh_label()),
            );
            8
        };

        // Stretch every other jump spanning the growth point; requeue any that no longer fit
        for interval in jump_tree.intervals_containing(&oversized_jump.jump_start_index()) {
            if known_oversized.contains(&interval.jump_from_block) {
                continue;
            }

            if interval.lengthen_jump(bytes_added_by_rewrite, small_jump_range) {
                known_oversized.insert(interval.jump_from_block);
                oversized_jumps.push(*interval);
            }
        }
    }

    // All rewrites are known now, so the trampoline blocks can be spliced into the order
    let mut new_block_order: Vec<Lbl> = block_order
        .iter()
        .flat_map(|lbl| -> Vec<Lbl> {
            match widen_branch.get(lbl) {
                None => vec![*lbl],
                Some((extra1, extra2)) => vec![*lbl, *extra1, *extra2],
            }
        })
        .collect();

    // Rewrite `goto` into `nop nop goto_w`
    for goto_block_label in widen_goto {
        let goto_terminated_block = blocks.get_mut(&goto_block_label).unwrap();
        goto_terminated_block.instructions.push(Insn::default());
        goto_terminated_block.instructions.push(Insn::default());
        let goto_label = match &goto_terminated_block.branch_end {
            BranchInstruction::Goto(lbl) => lbl,
            _other => unreachable!("goto rewrite target does not end in goto"),
        };
        goto_terminated_block.branch_end = BranchInstruction::GotoW(*goto_label);
    }

    // Rewrite `if*` into `ifnot*` over a `goto` and a `goto_w` trampoline
    for (branch_block_label, (extra_block1, extra_block2)) in widen_branch {
        let branch_terminated_block = blocks.get_mut(&branch_block_label).unwrap();
        let (new_branch_end, next_lbl, far_lbl) = match &branch_terminated_block.branch_end {
            BranchInstruction::If(comp, far_lbl, next_lbl) => (
                BranchInstruction::If(!*comp, extra_block2, extra_block1),
                *next_lbl,
                *far_lbl,
            ),
            BranchInstruction::IfICmp(comp, far_lbl, next_lbl) => (
                BranchInstruction::IfICmp(!*comp, extra_block2, extra_block1),
                *next_lbl,
                *far_lbl,
            ),
            BranchInstruction::IfACmp(comp, far_lbl, next_lbl) => (
                BranchInstruction::IfACmp(!*comp, extra_block2, extra_block1),
                *next_lbl,
                *far_lbl,
            ),
            BranchInstruction::IfNull(comp, far_lbl, next_lbl) => (
                BranchInstruction::IfNull(!*comp, extra_block2, extra_block1),
                *next_lbl,
                *far_lbl,
            ),
            _other => unreachable!("branch rewrite target does not end in a conditional"),
        };
        branch_terminated_block.branch_end = new_branch_end;

        blocks.insert(
            extra_block1,
            BasicBlock {
                instructions: OffsetVec::new(),
                frame: blocks[&next_lbl].frame.clone(),
                branch_end: BranchInstruction::Goto(next_lbl),
            },
        );
        blocks.insert(
            extra_block2,
            BasicBlock {
                instructions: OffsetVec::new(),
                frame: blocks[&far_lbl].frame.clone(),
                branch_end: BranchInstruction::GotoW(far_lbl),
            },
        );
    }

    std::mem::swap(&mut new_block_order, block_order);
}

#[derive(Debug)]
struct JumpInterval<Lbl> {
    /// Jump starts at the end of this block
    jump_from_block: Lbl,

    /// Blocks spanned by the jump, in layout-index space
    jump_range: RangeInclusive<usize>,

    /// Is this a `goto` (as opposed to an `if*`)?
    is_goto: bool,

    /// Is this a forward jump?
    is_forward: bool,

    /// Current distance being jumped, in bytes
    jump_distance: Cell<isize>,
}

impl<Lbl> JumpInterval<Lbl> {
    /// Does the jump distance fall outside what the instruction can encode?
    fn is_oversized(&self, small_jump_range: &impl RangeBounds<isize>) -> bool {
        !small_jump_range.contains(&self.jump_distance.get())
    }

    /// Stretch the jump distance away from zero and report whether it is now oversized
    fn lengthen_jump(&self, by: isize, small_jump_range: &impl RangeBounds<isize>) -> bool {
        let old_dist = self.jump_distance.get();
        let new_dist = if old_dist < 0 {
            old_dist - by
        } else {
            old_dist + by
        };
        self.jump_distance.set(new_dist);
        !small_jump_range.contains(&new_dist)
    }

    /// Index at which a rewrite of this jump grows the code
    ///
    /// This is the jumping end of the interval, not necessarily its low endpoint: a backward
    /// jump starts at the high end of its range.
    fn jump_start_index(&self) -> usize {
        if self.is_forward {
            *self.jump_range.start()
        } else {
            *self.jump_range.end()
        }
    }
}

impl<Lbl> Interval for JumpInterval<Lbl> {
    type Endpoint = usize;

    fn from(&self) -> usize {
        *self.jump_range.start()
    }

    fn until(&self) -> usize {
        *self.jump_range.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{
        EqComparison, Instruction, OrdComparison, SynLabel, SynLabelGenerator,
    };

    type Block = BasicBlock<(), Instruction, BranchInstruction<SynLabel, SynLabel, SynLabel>>;

    /// Block whose straight-line instructions are exactly `len` bytes long
    fn filler_block(
        len: usize,
        branch_end: BranchInstruction<SynLabel, SynLabel, SynLabel>,
    ) -> Block {
        let parity_nop = if len % 2 == 0 {
            None
        } else {
            Some(Instruction::Nop)
        };
        BasicBlock {
            instructions: parity_nop
                .into_iter()
                .chain((0..len / 2).flat_map(|_| [Instruction::IConst0, Instruction::Pop]))
                .collect(),
            frame: (),
            branch_end,
        }
    }

    /// Block containing only a branch instruction
    fn branch_block(branch_end: BranchInstruction<SynLabel, SynLabel, SynLabel>) -> Block {
        filler_block(0, branch_end)
    }

    fn block_map(blocks: &[(SynLabel, &Block)]) -> HashMap<SynLabel, Block> {
        blocks
            .iter()
            .map(|(lbl, block)| (*lbl, (*block).clone()))
            .collect()
    }

    /// Run the rewrite, then check the output layout, the output blocks, that every remaining
    /// regular jump fits in 16 bits (and every wide jump genuinely needed widening), and that no
    /// block moved by anything other than a multiple of four bytes.
    fn assert_jump_rewrite(
        block_order: &mut Vec<SynLabel>,
        blocks: &mut HashMap<SynLabel, Block>,
        label_generator: &mut SynLabelGenerator,
        expected_block_order: &[SynLabel],
        expected_blocks: &HashMap<SynLabel, Block>,
    ) {
        let old_offsets = BasicBlock::compute_block_offsets(block_order, blocks);

        widen_oversized_jumps(
            block_order,
            blocks,
            label_generator,
            &SIGNED_16BIT_JUMP_RANGE,
        );
        let new_offsets = BasicBlock::compute_block_offsets(block_order, blocks);

        assert_eq!(
            block_order, expected_block_order,
            "rewritten block layout order"
        );

        let block_keys: HashSet<SynLabel> = blocks.keys().copied().collect();
        let expected_keys: HashSet<SynLabel> = expected_blocks.keys().copied().collect();
        assert_eq!(block_keys, expected_keys, "rewritten block labels");

        for key in block_keys {
            let block = &blocks[&key];
            assert_eq!(block, &expected_blocks[&key], "block {:?}", key);

            let branch_offset = new_offsets[&key].0 + block.instructions.offset_len().0;
            match block.branch_end.jump_targets() {
                JumpTargets::None | JumpTargets::WideMany(_) => (),
                JumpTargets::Regular(target) => {
                    let jump_distance = new_offsets[&target].0 as isize - branch_offset as isize;
                    assert!(
                        i16::try_from(jump_distance).is_ok(),
                        "jump from {:?} is still oversized ({})",
                        key,
                        jump_distance
                    );
                }
                JumpTargets::Wide(target) => {
                    let jump_distance = new_offsets[&target].0 as isize - branch_offset as isize;
                    assert!(
                        i16::try_from(jump_distance).is_err(),
                        "jump from {:?} did not need widening ({})",
                        key,
                        jump_distance
                    );
                }
            }
        }

        for (lbl, old_offset) in old_offsets {
            let new_offset = new_offsets[&lbl];
            assert_eq!(
                new_offset.0.abs_diff(old_offset.0) % 4,
                0,
                "block {:?} moved from {} to {}",
                lbl,
                old_offset.0,
                new_offset.0,
            );
        }
    }

    #[test]
    fn no_jumps() {
        let label_generator = &mut SynLabelGenerator::new(SynLabel::START);

        let l0 = label_generator.fresh_label();
        let block_order = &mut vec![l0];

        let b0 = &filler_block(21, BranchInstruction::Return);
        let blocks = &mut block_map(&[(l0, b0)]);

        assert_jump_rewrite(
            block_order,
            blocks,
            label_generator,
            &[l0],
            &block_map(&[(l0, b0)]),
        );
    }

    #[test]
    fn small_jumps_left_alone() {
        let label_generator = &mut SynLabelGenerator::new(SynLabel::START);

        let l0 = label_generator.fresh_label();
        let l1 = label_generator.fresh_label();
        let l2 = label_generator.fresh_label();
        let block_order = &mut vec![l0, l1, l2];

        let b0 = &filler_block(6, BranchInstruction::IfICmp(OrdComparison::NE, l2, l1));
        let b1 = &filler_block(4, BranchInstruction::AReturn);
        let b2 = &filler_block(2, BranchInstruction::Goto(l1));
        let blocks = &mut block_map(&[(l0, b0), (l1, b1), (l2, b2)]);

        assert_jump_rewrite(
            block_order,
            blocks,
            label_generator,
            &[l0, l1, l2],
            &block_map(&[(l0, b0), (l1, b1), (l2, b2)]),
        );
    }

    #[test]
    fn backward_goto_widened() {
        let label_generator = &mut SynLabelGenerator::new(SynLabel::START);

        let l0 = label_generator.fresh_label();
        let l1 = label_generator.fresh_label();
        let l2 = label_generator.fresh_label();
        let block_order = &mut vec![l0, l1, l2];

        let b0 = &filler_block(4, BranchInstruction::Goto(l2));
        let b1 = &filler_block(4, BranchInstruction::Return);
        let b2 = &filler_block(40000, BranchInstruction::Goto(l1));
        let blocks = &mut block_map(&[(l0, b0), (l1, b1), (l2, b2)]);

        let new_b2 = &mut b2.clone();
        new_b2.instructions.push(Instruction::Nop);
        new_b2.instructions.push(Instruction::Nop);
        new_b2.branch_end = BranchInstruction::GotoW(l1);

        assert_jump_rewrite(
            block_order,
            blocks,
            label_generator,
            &[l0, l1, l2],
            &block_map(&[(l0, b0), (l1, b1), (l2, new_b2)]),
        );
    }

    #[test]
    fn forward_conditional_widened() {
        let label_generator = &mut SynLabelGenerator::new(SynLabel::START);

        let l0 = label_generator.fresh_label();
        let l1 = label_generator.fresh_label();
        let l2 = label_generator.fresh_label();
        let block_order = &mut vec![l0, l1, l2];

        let b0 = &filler_block(2, BranchInstruction::IfNull(EqComparison::EQ, l2, l1));
        let b1 = &filler_block(40000, BranchInstruction::Return);
        let b2 = &filler_block(2, BranchInstruction::Return);
        let blocks = &mut block_map(&[(l0, b0), (l1, b1), (l2, b2)]);

        let after_the_fact = &mut label_generator.clone();
        let l3 = after_the_fact.fresh_label();
        let l4 = after_the_fact.fresh_label();

        let new_b0 = &mut b0.clone();
        new_b0.branch_end = BranchInstruction::IfNull(EqComparison::NE, l4, l3);
        let b3 = &branch_block(BranchInstruction::Goto(l1));
        let b4 = &branch_block(BranchInstruction::GotoW(l2));

        assert_jump_rewrite(
            block_order,
            blocks,
            label_generator,
            &[l0, l3, l4, l1, l2],
            &block_map(&[(l0, new_b0), (l1, b1), (l2, b2), (l3, b3), (l4, b4)]),
        );
    }

    #[test]
    fn backward_conditional_widened() {
        let label_generator = &mut SynLabelGenerator::new(SynLabel::START);

        let l0 = label_generator.fresh_label();
        let l1 = label_generator.fresh_label();
        let l2 = label_generator.fresh_label();
        let l3 = label_generator.fresh_label();
        let block_order = &mut vec![l0, l1, l2, l3];

        let b0 = &filler_block(2, BranchInstruction::Goto(l2));
        let b1 = &filler_block(2, BranchInstruction::Return);
        let b2 = &filler_block(36000, BranchInstruction::IfICmp(OrdComparison::NE, l1, l3));
        let b3 = &filler_block(2, BranchInstruction::Return);
        let blocks = &mut block_map(&[(l0, b0), (l1, b1), (l2, b2), (l3, b3)]);

        let after_the_fact = &mut label_generator.clone();
        let l4 = after_the_fact.fresh_label();
        let l5 = after_the_fact.fresh_label();

        let new_b2 = &mut b2.clone();
        new_b2.branch_end = BranchInstruction::IfICmp(OrdComparison::EQ, l5, l4);
        let b4 = &branch_block(BranchInstruction::Goto(l3));
        let b5 = &branch_block(BranchInstruction::GotoW(l1));

        assert_jump_rewrite(
            block_order,
            blocks,
            label_generator,
            &[l0, l1, l2, l4, l5, l3],
            &block_map(&[
                (l0, b0),
                (l1, b1),
                (l2, new_b2),
                (l3, b3),
                (l4, b4),
                (l5, b5),
            ]),
        );
    }

    // An oversized backward `goto` whose 4-byte rewrite pushes a barely-fitting forward
    // conditional out of range, forcing a second rewrite.
    #[test]
    fn rewrite_cascade() {
        let label_generator = &mut SynLabelGenerator::new(SynLabel::START);

        let l0 = label_generator.fresh_label();
        let l1 = label_generator.fresh_label();
        let l2 = label_generator.fresh_label();
        let l3 = label_generator.fresh_label();
        let l4 = label_generator.fresh_label();
        let block_order = &mut vec![l0, l1, l2, l3, l4];

        let b0 = &filler_block(2, BranchInstruction::Goto(l2));
        let b1 = &filler_block(30000, BranchInstruction::IfICmp(OrdComparison::GT, l4, l2));
        let b2 = &filler_block(2800, BranchInstruction::Goto(l0));
        let b3 = &filler_block(29960, BranchInstruction::FallThrough(l4));
        let b4 = &filler_block(2, BranchInstruction::Return);
        let blocks = &mut block_map(&[(l0, b0), (l1, b1), (l2, b2), (l3, b3), (l4, b4)]);

        // The backward goto spans every byte before it; the forward conditional barely fits
        assert_eq!(
            b0.width() + b1.width() + 2800,
            32808,
            "backward goto l2->l0 is oversized",
        );
        assert_eq!(
            b1.branch_end.width() + b2.width() + b3.width(),
            i16::MAX as usize - 1,
            "forward conditional l1->l4 is barely undersized",
        );

        let after_the_fact = &mut label_generator.clone();
        let l5 = after_the_fact.fresh_label();
        let l6 = after_the_fact.fresh_label();

        let new_b1 = &mut b1.clone();
        new_b1.branch_end = BranchInstruction::IfICmp(OrdComparison::LE, l6, l5);
        let b5 = &branch_block(BranchInstruction::Goto(l2));
        let b6 = &branch_block(BranchInstruction::GotoW(l4));

        let new_b2 = &mut b2.clone();
        new_b2.instructions.push(Instruction::Nop);
        new_b2.instructions.push(Instruction::Nop);
        new_b2.branch_end = BranchInstruction::GotoW(l0);

        assert_jump_rewrite(
            block_order,
            blocks,
            label_generator,
            &[l0, l1, l5, l6, l2, l3, l4],
            &block_map(&[
                (l0, b0),
                (l1, new_b1),
                (l2, new_b2),
                (l3, b3),
                (l4, b4),
                (l5, b5),
                (l6, b6),
            ]),
        );
    }
}
