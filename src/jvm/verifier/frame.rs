use super::{AbstractValue, TypeConflict, VerificationType};
use crate::class_graph::InheritanceChecker;
use crate::jvm::class_file::{
    ClassConstantIndex, ConstantPoolOverflow, ConstantsPool, StackMapFrame,
};
use crate::jvm::{BinaryName, MethodDescriptor, RefType};
use crate::util::{Offset, OffsetVec, Width};
use std::collections::HashMap;

/// State of the locals and operand stack at one point in a method body
///
/// The stack stores one entry per value (the offsets in the [`OffsetVec`] account for two-word
/// values taking two slots). The locals are indexed by slot, so a `Long`/`Double` occupies its
/// own slot plus a [`VerificationType::Top`] padding slot right after it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Local variables, indexed by slot
    pub locals: Vec<AbstractValue>,

    /// Operand stack, with the top of the stack at the end
    pub stack: OffsetVec<AbstractValue>,
}

/// Why two frames for the same program point cannot be reconciled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeConflict {
    /// Paths reach the point with different operand stack depths
    MismatchedStackSizes { expected: usize, found: usize },

    /// Same depth, but some stack entry has no common supertype
    IncompatibleTypes(TypeConflict),
}

impl Frame {
    /// Frame at the very start of a method: the receiver (if there is one) followed by the
    /// parameters in the locals, and an empty stack
    pub fn method_entry(
        receiver: Option<RefType<BinaryName>>,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Frame {
        let mut locals = vec![];
        if let Some(receiver) = receiver {
            locals.push(VerificationType::Object(receiver));
        }
        for parameter in &descriptor.parameters {
            let value = AbstractValue::from(parameter.clone());
            let is_wide = value.width() == 2;
            locals.push(value);
            if is_wide {
                locals.push(VerificationType::Top);
            }
        }
        Frame {
            locals,
            stack: OffsetVec::new(),
        }
    }

    /// Merge another reachable state for the same program point into this one
    ///
    /// Returns whether anything in this frame changed (the fixpoint driver re-visits the point
    /// only if it did). A local slot one path never wrote degrades to
    /// [`VerificationType::Top`]; incompatible types meeting in a written slot or on the stack
    /// are an error, as is any difference in stack depth.
    pub fn merge(
        &mut self,
        incoming: &Frame,
        checker: &dyn InheritanceChecker,
    ) -> Result<bool, MergeConflict> {
        if self.stack.len() != incoming.stack.len() {
            return Err(MergeConflict::MismatchedStackSizes {
                expected: self.stack.len(),
                found: incoming.stack.len(),
            });
        }

        let mut changed = false;

        // Slots one path never touched are unusable after the join
        let common_slots = self.locals.len().min(incoming.locals.len());
        for slot in common_slots..self.locals.len() {
            if self.locals[slot] != VerificationType::Top {
                self.locals[slot] = VerificationType::Top;
                changed = true;
            }
        }
        for slot in 0..common_slots {
            let merged = self.locals[slot]
                .merge(&incoming.locals[slot], checker)
                .map_err(MergeConflict::IncompatibleTypes)?;
            if merged != self.locals[slot] {
                self.locals[slot] = merged;
                changed = true;
            }
        }

        let mut merged_stack = OffsetVec::new();
        for ((_, _, existing), (_, _, incoming)) in self.stack.iter().zip(incoming.stack.iter()) {
            let merged = existing
                .merge(incoming, checker)
                .map_err(MergeConflict::IncompatibleTypes)?;
            if merged != *existing {
                changed = true;
            }
            merged_stack.push(merged);
        }
        self.stack = merged_stack;

        Ok(changed)
    }

    /// Replace every occurrence of a value in the stack and locals
    ///
    /// This is how `invokespecial <init>` promotes all aliases of an uninitialized object in
    /// one step.
    pub fn replace_all(&mut self, from: &AbstractValue, to: &AbstractValue) {
        for local in self.locals.iter_mut() {
            if local == from {
                *local = to.clone();
            }
        }
        let stack = std::mem::take(&mut self.stack);
        self.stack = stack
            .into_iter()
            .map(|(_, _, value)| if value == *from { to.clone() } else { value })
            .collect();
    }

    /// Update the maximum stack and locals based on the current frame
    pub fn update_maximums(&self, max_locals: &mut Offset, max_stack: &mut Offset) {
        max_locals.0 = max_locals.0.max(self.locals.len());
        max_stack.0 = max_stack.0.max(self.stack.offset_len().0);
    }

    /// Resolve the frame into its serializable form
    pub fn into_serializable(
        &self,
        constants: &mut ConstantsPool,
        new_offsets: &HashMap<u32, u16>,
    ) -> Result<SerializableFrame, ConstantPoolOverflow> {
        // Two-word locals keep their padding slot implicit in the serialized form
        let mut locals = vec![];
        let mut skip_padding = false;
        for local in &self.locals {
            if skip_padding {
                skip_padding = false;
                continue;
            }
            skip_padding = local.width() == 2;
            locals.push(local.into_serializable(constants, new_offsets)?);
        }
        while let Some(VerificationType::Top) = locals.last() {
            locals.pop();
        }

        let stack = self
            .stack
            .iter()
            .map(|(_, _, value)| value.into_serializable(constants, new_offsets))
            .collect::<Result<Vec<_>, ConstantPoolOverflow>>()?;

        Ok(SerializableFrame { locals, stack })
    }
}

/// Frame with every type resolved for the classfile: classes are constant pool indices, offsets
/// are final bytecode offsets, and a two-word value is a single entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializableFrame {
    locals: Vec<VerificationType<ClassConstantIndex, u16>>,
    stack: Vec<VerificationType<ClassConstantIndex, u16>>,
}

impl SerializableFrame {
    /// Compress the frame into a stack map frame, relative to the previous frame in the table
    pub fn stack_map_frame(
        &self,
        offset_delta: u16,
        previous_frame: &SerializableFrame,
    ) -> StackMapFrame {
        let locals = &self.locals;
        let previous_locals = &previous_frame.locals;

        match self.stack.as_slice() {
            [] => {
                if locals.len() <= previous_locals.len()
                    && previous_locals.len() - locals.len() < 4
                    && *locals.as_slice() == previous_locals[..locals.len()]
                {
                    let chopped = (previous_locals.len() - locals.len()) as u8;
                    if chopped == 0 {
                        StackMapFrame::Same { offset_delta }
                    } else {
                        StackMapFrame::Chop {
                            offset_delta,
                            chopped,
                        }
                    }
                } else if locals.len() > previous_locals.len()
                    && locals.len() - previous_locals.len() < 4
                    && locals[..previous_locals.len()] == *previous_locals.as_slice()
                {
                    StackMapFrame::Append {
                        offset_delta,
                        locals: locals[previous_locals.len()..].to_vec(),
                    }
                } else {
                    self.full_frame(offset_delta)
                }
            }

            [stack_item] if *locals == *previous_locals => StackMapFrame::SameOneStackItem {
                offset_delta,
                stack: *stack_item,
            },

            _ => self.full_frame(offset_delta),
        }
    }

    fn full_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            locals: self.locals.clone(),
            stack: self.stack.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::FieldType;

    /// Hierarchy that only knows `java/lang/Object` sits on top
    struct FlatChecker;

    impl InheritanceChecker for FlatChecker {
        fn common_type(&self, class1: &BinaryName, class2: &BinaryName) -> BinaryName {
            if class1 == class2 {
                class1.clone()
            } else {
                BinaryName::OBJECT
            }
        }

        fn is_assignable(&self, sub_class: &BinaryName, super_class: &BinaryName) -> bool {
            sub_class == super_class || super_class == &BinaryName::OBJECT
        }
    }

    fn frame(locals: Vec<AbstractValue>, stack: Vec<AbstractValue>) -> Frame {
        Frame {
            locals,
            stack: stack.into_iter().collect(),
        }
    }

    #[test]
    fn method_entry_frame() {
        let descriptor = MethodDescriptor {
            parameters: vec![
                FieldType::LONG,
                FieldType::object(BinaryName::STRING),
                FieldType::INT,
            ],
            return_type: None,
        };
        let entry = Frame::method_entry(Some(RefType::OBJECT), &descriptor);

        assert_eq!(
            entry.locals,
            vec![
                VerificationType::Object(RefType::OBJECT),
                VerificationType::Long,
                VerificationType::Top,
                VerificationType::Object(RefType::Object(BinaryName::STRING)),
                VerificationType::Integer,
            ],
        );
        assert!(entry.stack.is_empty());
    }

    #[test]
    fn merge_reports_changes() {
        let mut target = frame(
            vec![VerificationType::Integer, VerificationType::Null],
            vec![],
        );

        // Identical incoming state: nothing changes
        let incoming = target.clone();
        assert_eq!(target.merge(&incoming, &FlatChecker), Ok(false));

        // A local widens: the frame changed
        let incoming = frame(
            vec![
                VerificationType::Integer,
                VerificationType::Object(RefType::Object(BinaryName::STRING)),
            ],
            vec![],
        );
        assert_eq!(target.merge(&incoming, &FlatChecker), Ok(true));
        assert_eq!(
            target.locals[1],
            VerificationType::Object(RefType::Object(BinaryName::STRING)),
        );

        // Merging that same state again is a no-op
        assert_eq!(target.merge(&incoming, &FlatChecker), Ok(false));
    }

    #[test]
    fn merge_rejects_conflicting_locals() {
        let mut target = frame(vec![VerificationType::Integer], vec![]);
        let incoming = frame(vec![VerificationType::Float], vec![]);
        assert!(matches!(
            target.merge(&incoming, &FlatChecker),
            Err(MergeConflict::IncompatibleTypes(_)),
        ));
    }

    #[test]
    fn merge_tops_out_missing_locals() {
        let mut target = frame(
            vec![VerificationType::Integer, VerificationType::Float],
            vec![],
        );
        let incoming = frame(vec![VerificationType::Integer], vec![]);
        assert_eq!(target.merge(&incoming, &FlatChecker), Ok(true));
        assert_eq!(
            target.locals,
            vec![VerificationType::Integer, VerificationType::Top],
        );
    }

    #[test]
    fn merge_rejects_stack_mismatches() {
        let mut target = frame(vec![], vec![VerificationType::Integer]);
        let incoming = frame(vec![], vec![]);
        assert_eq!(
            target.merge(&incoming, &FlatChecker),
            Err(MergeConflict::MismatchedStackSizes {
                expected: 1,
                found: 0,
            }),
        );

        let incoming = frame(vec![], vec![VerificationType::Float]);
        assert!(matches!(
            target.merge(&incoming, &FlatChecker),
            Err(MergeConflict::IncompatibleTypes(_)),
        ));
    }

    #[test]
    fn replace_all_occurrences() {
        let uninit = VerificationType::Uninitialized(2);
        let string = VerificationType::Object(RefType::Object(BinaryName::STRING));
        let mut state = frame(
            vec![uninit.clone(), VerificationType::Integer],
            vec![uninit.clone(), uninit.clone()],
        );

        state.replace_all(&uninit, &string);
        assert_eq!(state.locals, vec![string.clone(), VerificationType::Integer]);
        let stack: Vec<AbstractValue> = state.stack.iter().map(|(_, _, v)| v.clone()).collect();
        assert_eq!(stack, vec![string.clone(), string]);
    }

    #[test]
    fn maximums_count_slots_not_entries() {
        let state = frame(
            vec![VerificationType::Long, VerificationType::Top],
            vec![VerificationType::Double, VerificationType::Integer],
        );
        let mut max_locals = Offset(0);
        let mut max_stack = Offset(0);
        state.update_maximums(&mut max_locals, &mut max_stack);
        assert_eq!(max_locals, Offset(2));
        assert_eq!(max_stack, Offset(3));
    }

    #[test]
    fn frame_compression() {
        let mut constants = ConstantsPool::new();
        let new_offsets = HashMap::new();

        let base = frame(
            vec![VerificationType::Integer, VerificationType::Integer],
            vec![],
        )
        .into_serializable(&mut constants, &new_offsets)
        .unwrap();

        // Same locals, empty stack
        let same = base.stack_map_frame(7, &base);
        assert_eq!(same, StackMapFrame::Same { offset_delta: 7 });

        // Same locals, one stack item
        let one_item = frame(
            vec![VerificationType::Integer, VerificationType::Integer],
            vec![VerificationType::Null],
        )
        .into_serializable(&mut constants, &new_offsets)
        .unwrap();
        assert_eq!(
            one_item.stack_map_frame(3, &base),
            StackMapFrame::SameOneStackItem {
                offset_delta: 3,
                stack: VerificationType::Null,
            },
        );

        // Locals extended by a prefix-preserving tail
        let appended = frame(
            vec![
                VerificationType::Integer,
                VerificationType::Integer,
                VerificationType::Float,
            ],
            vec![],
        )
        .into_serializable(&mut constants, &new_offsets)
        .unwrap();
        assert_eq!(
            appended.stack_map_frame(11, &base),
            StackMapFrame::Append {
                offset_delta: 11,
                locals: vec![VerificationType::Float],
            },
        );

        // Reverse direction chops
        assert_eq!(
            base.stack_map_frame(2, &appended),
            StackMapFrame::Chop {
                offset_delta: 2,
                chopped: 1,
            },
        );

        // Incomparable locals fall back to a full frame
        let unrelated = frame(
            vec![VerificationType::Float, VerificationType::Long],
            vec![VerificationType::Integer, VerificationType::Integer],
        )
        .into_serializable(&mut constants, &new_offsets)
        .unwrap();
        assert_eq!(
            unrelated.stack_map_frame(0, &base),
            StackMapFrame::Full {
                offset_delta: 0,
                locals: vec![VerificationType::Float, VerificationType::Long],
                stack: vec![VerificationType::Integer, VerificationType::Integer],
            },
        );
    }

    #[test]
    fn serialization_drops_wide_padding_and_trailing_tops() {
        let mut constants = ConstantsPool::new();
        let new_offsets = HashMap::new();

        let state = frame(
            vec![
                VerificationType::Long,
                VerificationType::Top,
                VerificationType::Top,
                VerificationType::Top,
            ],
            vec![],
        )
        .into_serializable(&mut constants, &new_offsets)
        .unwrap();

        // The padding after the long is implicit and the dead tail slots are trimmed
        assert_eq!(state.locals, vec![VerificationType::Long]);
    }
}
