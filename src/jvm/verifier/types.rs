use crate::class_graph::InheritanceChecker;
use crate::jvm::class_file::{ClassConstantIndex, ConstantPoolOverflow, ConstantsPool};
use crate::jvm::{BaseType, BinaryName, FieldType, RefType, Serialize};
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::collections::HashMap;

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable value (either nothing was ever written here, or else incompatible types reached
    /// this slot from different control flow paths)
    ///
    /// `Top` also pads out the second slot of a two-word `Long`/`Double` local.
    Top,

    Integer,
    Float,
    Double,
    Long,
    Null,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but `<init>` has not been called
    ///
    ///   - during analysis, `U` identifies the `new` instruction that produced this value (so
    ///     two allocations are never confused, and so `<init>` knows which occurrences to
    ///     promote)
    ///   - when serializing into a classfile, `U` is the offset of the `new` instruction from
    ///     the start of the method body
    Uninitialized(U),

    /// Address of the instruction right after a `jsr`
    ///
    /// Merges against this are well-defined, but nothing produces it: `jsr`/`ret` never reach
    /// analysis since stack map tables rule them out.
    ReturnAddress(U),
}

impl<Cls, U> VerificationType<Cls, U> {
    /// Is this type a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long
            | VerificationType::ReturnAddress(_) => false,

            VerificationType::Null
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }
}

impl<C, U> From<FieldType<C>> for VerificationType<RefType<C>, U> {
    fn from(field_type: FieldType<C>) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl Serialize for VerificationType<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
            VerificationType::ReturnAddress(_) => {
                unreachable!("Return addresses never appear in stack maps")
            }
        };
        Ok(())
    }
}

impl<Cls, U> Width for VerificationType<Cls, U> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

impl<C, U> VerificationType<C, U> {
    pub fn map<C2, U2>(
        &self,
        map_class: impl Fn(&C) -> C2,
        map_uninitialized: impl Fn(&U) -> U2,
    ) -> VerificationType<C2, U2> {
        match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Null => VerificationType::Null,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit))
            }
            VerificationType::ReturnAddress(target) => {
                VerificationType::ReturnAddress(map_uninitialized(target))
            }
        }
    }
}

/// Value tracked by the analyzer: classes stay plain binary names and uninitialized objects are
/// identified by the index of the `new` instruction that made them.
pub type AbstractValue = VerificationType<RefType<BinaryName>, u32>;

/// Two values with no common supertype in the lattice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeConflict {
    pub left: AbstractValue,
    pub right: AbstractValue,
}

impl VerificationType<RefType<BinaryName>, u32> {
    /// Least upper bound of two values
    ///
    /// Merging happens when two control flow paths meet: the result must be usable in place of
    /// either input. Classes widen to a common supertype (which the checker must always be able
    /// to produce); mismatched categories are a [`TypeConflict`]. Callers decide what a conflict
    /// means: a local can absorb it by going to [`VerificationType::Top`], a stack slot cannot.
    pub fn merge(
        &self,
        other: &Self,
        checker: &dyn InheritanceChecker,
    ) -> Result<Self, TypeConflict> {
        match (self, other) {
            (t1, t2) if t1 == t2 => Ok(t1.clone()),

            (VerificationType::Top, _) | (_, VerificationType::Top) => Ok(VerificationType::Top),

            // `null` takes on whatever reference type flowed in from the other path
            (VerificationType::Null, VerificationType::Object(t))
            | (VerificationType::Object(t), VerificationType::Null) => {
                Ok(VerificationType::Object(t.clone()))
            }

            (VerificationType::Object(t1), VerificationType::Object(t2)) => Ok(
                VerificationType::Object(Self::merge_ref_types(t1, t2, checker)),
            ),

            // Everything else conflicts, including distinct `new` sites
            (t1, t2) => Err(TypeConflict {
                left: t1.clone(),
                right: t2.clone(),
            }),
        }
    }

    /// Common supertype of two distinct reference types
    ///
    /// Any mismatch involving an array widens straight to `java/lang/Object` instead of trying
    /// to compute a covariant common element type.
    fn merge_ref_types(
        t1: &RefType<BinaryName>,
        t2: &RefType<BinaryName>,
        checker: &dyn InheritanceChecker,
    ) -> RefType<BinaryName> {
        match (t1, t2) {
            (RefType::Object(class1), RefType::Object(class2)) => {
                RefType::Object(checker.common_type(class1, class2))
            }
            _ => RefType::OBJECT,
        }
    }

    /// Check if one value is assignable to another
    ///
    /// This matches the semantics of the prolog predicate `isJavaAssignable(sub_type, super_type)`
    /// in the JVM verifier specification, with plain class queries answered by the checker.
    pub fn is_assignable(
        sub_type: &Self,
        super_type: &Self,
        checker: &dyn InheritanceChecker,
    ) -> bool {
        match (sub_type, super_type) {
            (VerificationType::Integer, VerificationType::Integer) => true,
            (VerificationType::Float, VerificationType::Float) => true,
            (VerificationType::Long, VerificationType::Long) => true,
            (VerificationType::Double, VerificationType::Double) => true,
            (VerificationType::Null, VerificationType::Null) => true,
            (VerificationType::Null, VerificationType::Object(_)) => true,
            (VerificationType::Object(t1), VerificationType::Object(t2)) => {
                Self::is_ref_assignable(t1, t2, checker)
            }
            _ => false,
        }
    }

    fn is_ref_assignable(
        sub_type: &RefType<BinaryName>,
        super_type: &RefType<BinaryName>,
        checker: &dyn InheritanceChecker,
    ) -> bool {
        match (sub_type, super_type) {
            // Special superclass and interfaces of all arrays
            (RefType::PrimitiveArray(_) | RefType::ObjectArray(_), RefType::Object(class)) => {
                Self::is_array_type_assignable(class)
            }

            // Primitive arrays must match in dimension and type
            (RefType::PrimitiveArray(arr1), RefType::PrimitiveArray(arr2)) => arr1 == arr2,

            // Cursed (unsound) covariance of arrays
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2)) => {
                if arr1.additional_dimensions < arr2.additional_dimensions {
                    false
                } else if arr1.additional_dimensions == arr2.additional_dimensions {
                    checker.is_assignable(&arr1.element_type, &arr2.element_type)
                } else {
                    Self::is_array_type_assignable(&arr2.element_type)
                }
            }

            (RefType::Object(class1), RefType::Object(class2)) => {
                checker.is_assignable(class1, class2)
            }

            _ => false,
        }
    }

    /// Check if arrays can be assigned to a super type
    ///
    /// This bakes in knowledge of the small, finite set of super types arrays have.
    fn is_array_type_assignable(super_type: &BinaryName) -> bool {
        super_type == &BinaryName::OBJECT
            || super_type == &BinaryName::CLONEABLE
            || super_type == &BinaryName::SERIALIZABLE
    }

    /// Resolve the type into its serializable form
    ///
    /// Classes turn into constant pool entries and uninitialized values turn into the final
    /// bytecode offset of the `new` instruction that produced them.
    pub fn into_serializable(
        &self,
        constants: &mut ConstantsPool,
        new_offsets: &HashMap<u32, u16>,
    ) -> Result<VerificationType<ClassConstantIndex, u16>, ConstantPoolOverflow> {
        match self {
            VerificationType::Top => Ok(VerificationType::Top),
            VerificationType::Integer => Ok(VerificationType::Integer),
            VerificationType::Float => Ok(VerificationType::Float),
            VerificationType::Double => Ok(VerificationType::Double),
            VerificationType::Long => Ok(VerificationType::Long),
            VerificationType::Null => Ok(VerificationType::Null),
            VerificationType::Object(ref_type) => {
                let name = constants.get_utf8(ref_type.render_internal())?;
                Ok(VerificationType::Object(constants.get_class(name)?))
            }
            VerificationType::Uninitialized(new_insn) => {
                Ok(VerificationType::Uninitialized(new_offsets[new_insn]))
            }
            VerificationType::ReturnAddress(_) => {
                unreachable!("Return addresses never appear in stack maps")
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;

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

    fn object(name: &str) -> AbstractValue {
        VerificationType::Object(RefType::Object(
            BinaryName::from_string(name.to_string()).unwrap(),
        ))
    }

    fn int_array() -> AbstractValue {
        VerificationType::Object(RefType::array(FieldType::INT))
    }

    fn string_array() -> AbstractValue {
        VerificationType::Object(RefType::array(FieldType::object(BinaryName::STRING)))
    }

    #[test]
    fn merge_is_idempotent() {
        let samples = vec![
            VerificationType::Top,
            VerificationType::Integer,
            VerificationType::Long,
            VerificationType::Null,
            VerificationType::Uninitialized(3),
            VerificationType::ReturnAddress(7),
            object("java/lang/String"),
            int_array(),
        ];
        for sample in samples {
            assert_eq!(sample.merge(&sample, &FlatChecker), Ok(sample.clone()));
        }
    }

    #[test]
    fn merge_null_with_reference() {
        assert_eq!(
            VerificationType::Null.merge(&object("java/lang/String"), &FlatChecker),
            Ok(object("java/lang/String")),
        );
        assert_eq!(
            int_array().merge(&VerificationType::Null, &FlatChecker),
            Ok(int_array()),
        );
    }

    #[test]
    fn merge_classes_through_checker() {
        assert_eq!(
            object("java/lang/String").merge(&object("java/lang/StringBuilder"), &FlatChecker),
            Ok(object("java/lang/Object")),
        );
    }

    #[test]
    fn merge_mismatched_arrays_to_object() {
        assert_eq!(
            int_array().merge(&string_array(), &FlatChecker),
            Ok(object("java/lang/Object")),
        );
        assert_eq!(
            string_array().merge(&object("java/lang/String"), &FlatChecker),
            Ok(object("java/lang/Object")),
        );
    }

    #[test]
    fn merge_top_absorbs() {
        assert_eq!(
            VerificationType::Top.merge(&VerificationType::Integer, &FlatChecker),
            Ok(VerificationType::Top),
        );
        assert_eq!(
            object("java/lang/String").merge(&VerificationType::Top, &FlatChecker),
            Ok(VerificationType::Top),
        );
    }

    #[test]
    fn merge_conflicts() {
        assert!(VerificationType::Integer
            .merge(&VerificationType::Float, &FlatChecker)
            .is_err());
        assert!(VerificationType::Long
            .merge(&VerificationType::Double, &FlatChecker)
            .is_err());
        assert!(VerificationType::Integer
            .merge(&object("java/lang/String"), &FlatChecker)
            .is_err());
        assert!(VerificationType::Null
            .merge(&VerificationType::Uninitialized(0), &FlatChecker)
            .is_err());

        // Two different allocation sites must not be confused
        assert!(VerificationType::Uninitialized(0)
            .merge(&VerificationType::Uninitialized(1), &FlatChecker)
            .is_err());
    }

    #[test]
    fn assignability() {
        let string = object("java/lang/String");
        let obj = object("java/lang/Object");

        assert!(AbstractValue::is_assignable(&string, &obj, &FlatChecker));
        assert!(!AbstractValue::is_assignable(&obj, &string, &FlatChecker));
        assert!(AbstractValue::is_assignable(
            &VerificationType::Null,
            &string,
            &FlatChecker
        ));
        assert!(!AbstractValue::is_assignable(
            &VerificationType::Top,
            &obj,
            &FlatChecker
        ));
        assert!(!AbstractValue::is_assignable(
            &VerificationType::Uninitialized(0),
            &obj,
            &FlatChecker
        ));
    }

    #[test]
    fn array_assignability() {
        let cloneable = object("java/lang/Cloneable");
        let serializable = object("java/io/Serializable");
        let obj = object("java/lang/Object");

        // Arrays are assignable only to `Object`, `Cloneable`, and `Serializable`
        for array in [int_array(), string_array()] {
            assert!(AbstractValue::is_assignable(&array, &obj, &FlatChecker));
            assert!(AbstractValue::is_assignable(
                &array,
                &cloneable,
                &FlatChecker
            ));
            assert!(AbstractValue::is_assignable(
                &array,
                &serializable,
                &FlatChecker
            ));
            assert!(!AbstractValue::is_assignable(
                &array,
                &object("java/lang/String"),
                &FlatChecker
            ));
        }

        // Primitive arrays must match exactly
        assert!(!AbstractValue::is_assignable(
            &int_array(),
            &VerificationType::Object(RefType::array(FieldType::LONG)),
            &FlatChecker
        ));

        // Covariance of object arrays with equal dimensions
        let object_array =
            VerificationType::Object(RefType::array(FieldType::object(BinaryName::OBJECT)));
        assert!(AbstractValue::is_assignable(
            &string_array(),
            &object_array,
            &FlatChecker
        ));
        assert!(!AbstractValue::is_assignable(
            &object_array,
            &string_array(),
            &FlatChecker
        ));
    }

    #[test]
    fn serialized_tags() {
        let mut constants = ConstantsPool::new();
        let new_offsets = HashMap::from([(4u32, 17u16)]);

        let cases: Vec<(AbstractValue, Vec<u8>)> = vec![
            (VerificationType::Top, vec![0]),
            (VerificationType::Integer, vec![1]),
            (VerificationType::Float, vec![2]),
            (VerificationType::Double, vec![3]),
            (VerificationType::Long, vec![4]),
            (VerificationType::Null, vec![5]),
            (object("java/lang/String"), vec![7, 0, 2]),
            (VerificationType::Uninitialized(4), vec![8, 0, 17]),
        ];
        for (value, expected) in cases {
            let serializable = value
                .into_serializable(&mut constants, &new_offsets)
                .unwrap();
            let mut buffer = vec![];
            serializable.serialize(&mut buffer).unwrap();
            assert_eq!(buffer, expected, "encoding of {:?}", value);
        }
    }
}
