//! Class hierarchy snapshot backing analysis
//!
//! The analyzer needs to answer two questions about classes it does not define: "what is the
//! common supertype of these two?" (when control flow joins) and "is this assignable to that?"
//! (when checking stores, arguments, and `athrow`). Both go through the [`InheritanceChecker`]
//! trait, passed by reference into every call, so the analyzer never owns or mutates hierarchy
//! state.
//!
//! [`ClassGraph`] is the provided implementation: an arena-backed graph of classes, interfaces,
//! and their members which a workspace layer populates up front (usually starting from
//! [`ClassGraph::insert_java_library_types`]) and then hands out by shared reference. Both
//! queries are total; names the graph has never heard of degrade to `java/lang/Object` rather
//! than failing, which keeps analysis running on incomplete workspaces at the cost of looser
//! frames.

use crate::jvm::code::InvokeType;
use crate::jvm::{
    BinaryName, FieldType, MethodDescriptor, Name, RenderDescriptor, UnqualifiedName,
};
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::collections::HashSet;
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

mod java_library;

pub use java_library::*;

/// Class-hierarchy queries made during analysis
///
/// Both operations are total: implementations fall back to `java/lang/Object` (the top of the
/// reference hierarchy) rather than failing on names they do not know. An implementation shared
/// across compile workers must also be `Sync`; [`ClassGraph`] is not, so batch callers build
/// one graph per worker or bring their own snapshot.
pub trait InheritanceChecker {
    /// Most specific class both inputs are assignable to
    fn common_type(&self, class1: &BinaryName, class2: &BinaryName) -> BinaryName;

    /// Is the first class assignable to the second?
    fn is_assignable(&self, sub_class: &BinaryName, super_class: &BinaryName) -> bool;
}

/// Source of raw classfile bytes
///
/// The assembler itself never reads classfiles (hierarchy queries go through
/// [`InheritanceChecker`]). This is the boundary where a workspace layer that does parse
/// classfiles plugs in, eg. to populate a [`ClassGraph`] from a classpath, or to resolve
/// inline expressions into constants before assembly.
pub trait ClassSupplier {
    /// Raw bytes of the named class, if the supplier knows it
    fn class_bytes(&self, class: &BinaryName) -> Option<Vec<u8>>;
}

pub struct ClassGraphArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
    method_arena: Arena<MethodData<'g>>,
    field_arena: Arena<FieldData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            class_arena: Arena::new(),
            method_arena: Arena::new(),
            field_arena: Arena::new(),
        }
    }
}

/// Tracks the relationships between classes/interfaces and the members on those classes
///
/// All of the data is allocated in [`ClassGraphArenas`] and connected with plain references, so
/// navigating the graph is cheap and the graph can only ever grow (existing nodes are never
/// removed or rewritten, they just gain members).
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    classes: FrozenMap<&'g BinaryName, &'g ClassData<'g>>,
}

impl<'g> ClassGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph {
            arenas,
            classes: FrozenMap::new(),
        }
    }

    /// Object to object assignability
    ///
    /// This does a search up the superclasses and superinterfaces looking for the super type.
    fn is_object_type_assignable(sub_type: &ClassData<'g>, super_type: &ClassData<'g>) -> bool {
        let mut supertypes_to_visit: Vec<&ClassData<'g>> = vec![sub_type];
        let mut dont_revisit: HashSet<&BinaryName> = HashSet::new();
        dont_revisit.insert(&sub_type.name);

        // Optimization: if the super type is a class, no interface edge can ever reach it
        let super_is_class: bool = !super_type.is_interface;

        while let Some(class_data) = supertypes_to_visit.pop() {
            if class_data.name == super_type.name {
                return true;
            }

            // Enqueue next types to visit
            if let Some(superclass) = &class_data.superclass {
                if dont_revisit.insert(&superclass.name) {
                    supertypes_to_visit.push(superclass);
                }
            }
            if !super_is_class {
                for interface in &class_data.interfaces {
                    if dont_revisit.insert(&interface.name) {
                        supertypes_to_visit.push(interface);
                    }
                }
            }
        }

        false
    }

    pub fn lookup_class(&'g self, name: &BinaryName) -> Option<&'g ClassData<'g>> {
        self.classes.get(name)
    }

    /// Add a new class to the class graph
    pub fn add_class(&self, data: ClassData<'g>) -> &'g ClassData<'g> {
        let data = &*self.arenas.class_arena.alloc(data);
        self.classes.insert(&data.name, data);
        data
    }

    /// Add a field to the class graph and to its class
    pub fn add_field(&self, field: FieldData<'g>) -> &'g FieldData<'g> {
        let data = &*self.arenas.field_arena.alloc(field);
        data.class.fields.push(data);
        data
    }

    /// Add a method to the class graph and to its class
    ///
    /// Registering the same method twice returns the original node instead of duplicating it.
    pub fn add_method(&self, method: MethodData<'g>) -> &'g MethodData<'g> {
        if let Some(m) = method.class.methods.iter().find(|m| {
            m.name == method.name
                && m.descriptor == method.descriptor
                && m.is_static == method.is_static
        }) {
            m
        } else {
            let data = &*self.arenas.method_arena.alloc(method);
            data.class.methods.push(data);
            data
        }
    }

    /// Add standard types to the class graph
    pub fn insert_java_library_types(&self) -> JavaLibrary<'g> {
        JavaLibrary::add_to_graph(self)
    }
}

impl<'g> InheritanceChecker for ClassGraph<'g> {
    /// Most specific class both inputs are assignable to
    ///
    /// When neither input admits the other, this walks the first input's superclass chain until
    /// it hits a class the second input is assignable to; `java/lang/Object` terminates the
    /// chain so there is always an answer. Two unrelated interfaces (or any unknown name) land
    /// on `java/lang/Object` too.
    fn common_type(&self, class1: &BinaryName, class2: &BinaryName) -> BinaryName {
        if self.is_assignable(class2, class1) {
            return class1.clone();
        }
        if self.is_assignable(class1, class2) {
            return class2.clone();
        }

        let mut next = match self.classes.get(class1) {
            Some(class_data) => class_data.superclass,
            None => None,
        };
        while let Some(class_data) = next {
            if self.is_assignable(class2, &class_data.name) {
                return class_data.name.clone();
            }
            next = class_data.superclass;
        }
        BinaryName::OBJECT
    }

    fn is_assignable(&self, sub_class: &BinaryName, super_class: &BinaryName) -> bool {
        if sub_class == super_class || super_class == &BinaryName::OBJECT {
            return true;
        }
        match (self.classes.get(sub_class), self.classes.get(super_class)) {
            (Some(sub_data), Some(super_data)) => {
                Self::is_object_type_assignable(sub_data, super_data)
            }
            _ => false,
        }
    }
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<&'g ClassData<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: FrozenVec<&'g ClassData<'g>>,

    /// Is this an interface?
    pub is_interface: bool,

    /// Methods
    pub methods: FrozenVec<&'g MethodData<'g>>,

    /// Fields
    pub fields: FrozenVec<&'g FieldData<'g>>,
}

impl<'g> ClassData<'g> {
    pub fn new(
        name: BinaryName,
        superclass: &'g ClassData<'g>,
        is_interface: bool,
    ) -> ClassData<'g> {
        ClassData {
            name,
            superclass: Some(superclass),
            interfaces: FrozenVec::new(),
            is_interface,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
        }
    }
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

#[derive(PartialEq, Eq)]
pub struct MethodData<'g> {
    /// Class
    pub class: &'g ClassData<'g>,

    /// Name of the method
    pub name: UnqualifiedName,

    /// Type of the method
    pub descriptor: MethodDescriptor<BinaryName>,

    /// Is this a static method?
    pub is_static: bool,
}

impl<'g> Debug for MethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

impl<'g> MethodData<'g> {
    /// With the exception of `invokespecial` vs. `invokevirtual`, there is usually only one
    /// valid way to invoke a method. This function finds it.
    pub fn infer_invoke_type(&self) -> InvokeType {
        if self.is_static {
            InvokeType::Static
        } else if self.name == UnqualifiedName::INIT || self.name == UnqualifiedName::CLINIT {
            InvokeType::Special
        } else if self.class.is_interface {
            let n = self.descriptor.parameter_length(true) as u8;
            InvokeType::Interface(n)
        } else {
            InvokeType::Virtual
        }
    }
}

#[derive(PartialEq, Eq)]
pub struct FieldData<'g> {
    /// Class
    pub class: &'g ClassData<'g>,

    /// Name of the field
    pub name: UnqualifiedName,

    /// Type of the field
    pub descriptor: FieldType<BinaryName>,

    /// Is this a static field?
    pub is_static: bool,
}

impl<'g> Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;

    fn name(s: &str) -> BinaryName {
        BinaryName::from_string(s.to_string()).unwrap()
    }

    #[test]
    fn library_assignability() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        // Superclass chains
        assert!(class_graph.is_assignable(&BinaryName::STRING, &BinaryName::OBJECT));
        assert!(class_graph.is_assignable(&BinaryName::INTEGER, &BinaryName::NUMBER));
        assert!(class_graph.is_assignable(
            &BinaryName::ARITHMETICEXCEPTION,
            &BinaryName::THROWABLE
        ));
        assert!(!class_graph.is_assignable(&BinaryName::OBJECT, &BinaryName::STRING));
        assert!(!class_graph.is_assignable(&BinaryName::ERROR, &BinaryName::EXCEPTION));

        // Interface edges, including inherited and transitive ones
        assert!(class_graph.is_assignable(&BinaryName::STRING, &BinaryName::CHARSEQUENCE));
        assert!(class_graph.is_assignable(&BinaryName::ARRAYLIST, &BinaryName::LIST));
        assert!(class_graph.is_assignable(&BinaryName::ARRAYLIST, &BinaryName::ITERABLE));
        assert!(class_graph.is_assignable(&BinaryName::HASHMAP, &BinaryName::MAP));
        assert!(!class_graph.is_assignable(&BinaryName::ARRAYLIST, &BinaryName::MAP));
    }

    #[test]
    fn library_common_types() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        // One side admits the other
        assert_eq!(
            class_graph.common_type(&BinaryName::STRING, &BinaryName::OBJECT),
            BinaryName::OBJECT,
        );
        assert_eq!(
            class_graph.common_type(&BinaryName::RUNTIMEEXCEPTION, &BinaryName::EXCEPTION),
            BinaryName::EXCEPTION,
        );

        // Meet further up the chain
        assert_eq!(
            class_graph.common_type(&BinaryName::INTEGER, &BinaryName::DOUBLE),
            BinaryName::NUMBER,
        );
        assert_eq!(
            class_graph.common_type(
                &BinaryName::NULLPOINTEREXCEPTION,
                &BinaryName::ARITHMETICEXCEPTION
            ),
            BinaryName::RUNTIMEEXCEPTION,
        );

        // Chains that only meet at the top
        assert_eq!(
            class_graph.common_type(&BinaryName::STRING, &BinaryName::STRINGBUILDER),
            BinaryName::OBJECT,
        );
    }

    #[test]
    fn unknown_names_degrade_to_object() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let unknown = name("com/example/Missing");
        let other = name("com/example/AlsoMissing");

        assert!(class_graph.is_assignable(&unknown, &BinaryName::OBJECT));
        assert!(class_graph.is_assignable(&unknown, &unknown));
        assert!(!class_graph.is_assignable(&unknown, &BinaryName::STRING));
        assert_eq!(class_graph.common_type(&unknown, &other), BinaryName::OBJECT);
        assert_eq!(class_graph.common_type(&unknown, &unknown), unknown);
    }

    #[test]
    fn added_classes_join_the_hierarchy() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types();

        let widget = class_graph.add_class(ClassData::new(
            name("com/example/Widget"),
            java.lang.object,
            false,
        ));
        widget.interfaces.push(java.lang.runnable);
        let gadget = class_graph.add_class(ClassData::new(name("com/example/Gadget"), widget, false));

        assert!(class_graph.is_assignable(&gadget.name, &widget.name));
        assert!(class_graph.is_assignable(&gadget.name, &BinaryName::RUNNABLE));
        assert_eq!(
            class_graph.common_type(&gadget.name, &widget.name),
            widget.name,
        );
        assert_eq!(
            class_graph.common_type(&gadget.name, &BinaryName::STRING),
            BinaryName::OBJECT,
        );
    }

    #[test]
    fn method_registration_dedups() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types();

        let widget = class_graph.add_class(ClassData::new(
            name("com/example/Widget"),
            java.lang.object,
            false,
        ));
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::INT],
            return_type: Some(FieldType::object(BinaryName::STRING)),
        };
        let render = UnqualifiedName::from_string("render".to_string()).unwrap();

        let first = class_graph.add_method(MethodData {
            class: widget,
            name: render.clone(),
            descriptor: descriptor.clone(),
            is_static: false,
        });
        let second = class_graph.add_method(MethodData {
            class: widget,
            name: render,
            descriptor,
            is_static: false,
        });
        assert!(std::ptr::eq(first, second));
        assert_eq!(widget.methods.len(), 1);

        assert_eq!(first.infer_invoke_type(), InvokeType::Virtual);
    }
}
