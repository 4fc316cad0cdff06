use super::{ClassData, ClassGraph};
use crate::jvm::BinaryName;
use elsa::FrozenVec;

/// Standard library classes the analyzer is likely to meet
///
/// This is not the whole standard library, just the slice of it that shows up in ordinary
/// bytecode: the `java.lang` core, the exception hierarchy, `java.lang.invoke` (for
/// `invokedynamic` plumbing), and the common collections. Anything outside this set can still
/// be analyzed, it just merges pessimistically (see [`ClassGraph::common_type`]) until the
/// caller registers it.
pub struct JavaLibrary<'g> {
    pub lang: LangClasses<'g>,
    pub io: IoClasses<'g>,
    pub util: UtilClasses<'g>,
}

/// Classes inside `java.lang.*`
pub struct LangClasses<'g> {
    pub object: &'g ClassData<'g>,
    pub char_sequence: &'g ClassData<'g>,
    pub comparable: &'g ClassData<'g>,
    pub cloneable: &'g ClassData<'g>,
    pub runnable: &'g ClassData<'g>,
    pub iterable: &'g ClassData<'g>,
    pub string: &'g ClassData<'g>,
    pub class: &'g ClassData<'g>,
    pub number: &'g ClassData<'g>,
    pub integer: &'g ClassData<'g>,
    pub long: &'g ClassData<'g>,
    pub float: &'g ClassData<'g>,
    pub double: &'g ClassData<'g>,
    pub math: &'g ClassData<'g>,
    pub string_builder: &'g ClassData<'g>,
    pub system: &'g ClassData<'g>,
    pub invoke: InvokeClasses<'g>,
    pub throwable: &'g ClassData<'g>,
    pub error: &'g ClassData<'g>,
    pub assertion_error: &'g ClassData<'g>,
    pub exception: &'g ClassData<'g>,
    pub runtime_exception: &'g ClassData<'g>,
    pub arithmetic_exception: &'g ClassData<'g>,
    pub illegal_argument_exception: &'g ClassData<'g>,
    pub illegal_state_exception: &'g ClassData<'g>,
    pub null_pointer_exception: &'g ClassData<'g>,
}

/// Classes inside `java.lang.invoke.*`
pub struct InvokeClasses<'g> {
    pub call_site: &'g ClassData<'g>,
    pub method_handle: &'g ClassData<'g>,
    pub method_handles_lookup: &'g ClassData<'g>,
    pub method_type: &'g ClassData<'g>,
}

/// Classes inside `java.io.*`
pub struct IoClasses<'g> {
    pub serializable: &'g ClassData<'g>,
    pub print_stream: &'g ClassData<'g>,
}

/// Classes inside `java.util.*`
pub struct UtilClasses<'g> {
    pub collection: &'g ClassData<'g>,
    pub list: &'g ClassData<'g>,
    pub set: &'g ClassData<'g>,
    pub map: &'g ClassData<'g>,
    pub abstract_collection: &'g ClassData<'g>,
    pub abstract_list: &'g ClassData<'g>,
    pub abstract_set: &'g ClassData<'g>,
    pub abstract_map: &'g ClassData<'g>,
    pub array_list: &'g ClassData<'g>,
    pub hash_set: &'g ClassData<'g>,
    pub hash_map: &'g ClassData<'g>,
}

impl<'g> JavaLibrary<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> JavaLibrary<'g> {
        let lang = LangClasses::add_to_graph(class_graph);
        let io = IoClasses::add_to_graph(class_graph, &lang);
        let util = UtilClasses::add_to_graph(class_graph, &lang);

        // Interface edges that cross package boundaries
        lang.string.interfaces.push(io.serializable);
        lang.number.interfaces.push(io.serializable);
        lang.string_builder.interfaces.push(io.serializable);
        lang.throwable.interfaces.push(io.serializable);
        lang.class.interfaces.push(io.serializable);
        lang.invoke.method_type.interfaces.push(io.serializable);
        util.array_list.interfaces.push(io.serializable);
        util.hash_set.interfaces.push(io.serializable);
        util.hash_map.interfaces.push(io.serializable);

        JavaLibrary { lang, io, util }
    }
}

impl<'g> LangClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> LangClasses<'g> {
        let object = class_graph.add_class(ClassData {
            name: BinaryName::OBJECT,
            superclass: None,
            interfaces: FrozenVec::new(),
            is_interface: false,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
        });

        let char_sequence =
            class_graph.add_class(ClassData::new(BinaryName::CHARSEQUENCE, object, true));
        let comparable =
            class_graph.add_class(ClassData::new(BinaryName::COMPARABLE, object, true));
        let cloneable = class_graph.add_class(ClassData::new(BinaryName::CLONEABLE, object, true));
        let runnable = class_graph.add_class(ClassData::new(BinaryName::RUNNABLE, object, true));
        let iterable = class_graph.add_class(ClassData::new(BinaryName::ITERABLE, object, true));

        let string = class_graph.add_class(ClassData::new(BinaryName::STRING, object, false));
        string.interfaces.push(char_sequence);
        string.interfaces.push(comparable);

        let class = class_graph.add_class(ClassData::new(BinaryName::CLASS, object, false));

        let number = class_graph.add_class(ClassData::new(BinaryName::NUMBER, object, false));
        let integer = class_graph.add_class(ClassData::new(BinaryName::INTEGER, number, false));
        integer.interfaces.push(comparable);
        let long = class_graph.add_class(ClassData::new(BinaryName::LONG, number, false));
        long.interfaces.push(comparable);
        let float = class_graph.add_class(ClassData::new(BinaryName::FLOAT, number, false));
        float.interfaces.push(comparable);
        let double = class_graph.add_class(ClassData::new(BinaryName::DOUBLE, number, false));
        double.interfaces.push(comparable);

        let math = class_graph.add_class(ClassData::new(BinaryName::MATH, object, false));
        let string_builder =
            class_graph.add_class(ClassData::new(BinaryName::STRINGBUILDER, object, false));
        string_builder.interfaces.push(char_sequence);
        let system = class_graph.add_class(ClassData::new(BinaryName::SYSTEM, object, false));

        let invoke = InvokeClasses::add_to_graph(class_graph, object);

        let throwable = class_graph.add_class(ClassData::new(BinaryName::THROWABLE, object, false));
        let error = class_graph.add_class(ClassData::new(BinaryName::ERROR, throwable, false));
        let assertion_error =
            class_graph.add_class(ClassData::new(BinaryName::ASSERTIONERROR, error, false));
        let exception =
            class_graph.add_class(ClassData::new(BinaryName::EXCEPTION, throwable, false));
        let runtime_exception =
            class_graph.add_class(ClassData::new(BinaryName::RUNTIMEEXCEPTION, exception, false));
        let arithmetic_exception = class_graph.add_class(ClassData::new(
            BinaryName::ARITHMETICEXCEPTION,
            runtime_exception,
            false,
        ));
        let illegal_argument_exception = class_graph.add_class(ClassData::new(
            BinaryName::ILLEGALARGUMENTEXCEPTION,
            runtime_exception,
            false,
        ));
        let illegal_state_exception = class_graph.add_class(ClassData::new(
            BinaryName::ILLEGALSTATEEXCEPTION,
            runtime_exception,
            false,
        ));
        let null_pointer_exception = class_graph.add_class(ClassData::new(
            BinaryName::NULLPOINTEREXCEPTION,
            runtime_exception,
            false,
        ));

        LangClasses {
            object,
            char_sequence,
            comparable,
            cloneable,
            runnable,
            iterable,
            string,
            class,
            number,
            integer,
            long,
            float,
            double,
            math,
            string_builder,
            system,
            invoke,
            throwable,
            error,
            assertion_error,
            exception,
            runtime_exception,
            arithmetic_exception,
            illegal_argument_exception,
            illegal_state_exception,
            null_pointer_exception,
        }
    }
}

impl<'g> InvokeClasses<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        object: &'g ClassData<'g>,
    ) -> InvokeClasses<'g> {
        let call_site = class_graph.add_class(ClassData::new(BinaryName::CALLSITE, object, false));
        let method_handle =
            class_graph.add_class(ClassData::new(BinaryName::METHODHANDLE, object, false));
        let method_handles_lookup = class_graph.add_class(ClassData::new(
            BinaryName::METHODHANDLES_LOOKUP,
            object,
            false,
        ));
        let method_type =
            class_graph.add_class(ClassData::new(BinaryName::METHODTYPE, object, false));

        InvokeClasses {
            call_site,
            method_handle,
            method_handles_lookup,
            method_type,
        }
    }
}

impl<'g> IoClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>, lang: &LangClasses<'g>) -> IoClasses<'g> {
        let serializable =
            class_graph.add_class(ClassData::new(BinaryName::SERIALIZABLE, lang.object, true));
        let print_stream =
            class_graph.add_class(ClassData::new(BinaryName::PRINTSTREAM, lang.object, false));

        IoClasses {
            serializable,
            print_stream,
        }
    }
}

impl<'g> UtilClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>, lang: &LangClasses<'g>) -> UtilClasses<'g> {
        let collection =
            class_graph.add_class(ClassData::new(BinaryName::COLLECTION, lang.object, true));
        collection.interfaces.push(lang.iterable);
        let list = class_graph.add_class(ClassData::new(BinaryName::LIST, lang.object, true));
        list.interfaces.push(collection);
        let set = class_graph.add_class(ClassData::new(BinaryName::SET, lang.object, true));
        set.interfaces.push(collection);
        let map = class_graph.add_class(ClassData::new(BinaryName::MAP, lang.object, true));

        let abstract_collection = class_graph.add_class(ClassData::new(
            BinaryName::ABSTRACTCOLLECTION,
            lang.object,
            false,
        ));
        abstract_collection.interfaces.push(collection);
        let abstract_list = class_graph.add_class(ClassData::new(
            BinaryName::ABSTRACTLIST,
            abstract_collection,
            false,
        ));
        abstract_list.interfaces.push(list);
        let abstract_set = class_graph.add_class(ClassData::new(
            BinaryName::ABSTRACTSET,
            abstract_collection,
            false,
        ));
        abstract_set.interfaces.push(set);
        let abstract_map =
            class_graph.add_class(ClassData::new(BinaryName::ABSTRACTMAP, lang.object, false));
        abstract_map.interfaces.push(map);

        let array_list =
            class_graph.add_class(ClassData::new(BinaryName::ARRAYLIST, abstract_list, false));
        array_list.interfaces.push(list);
        array_list.interfaces.push(lang.cloneable);
        let hash_set =
            class_graph.add_class(ClassData::new(BinaryName::HASHSET, abstract_set, false));
        hash_set.interfaces.push(set);
        hash_set.interfaces.push(lang.cloneable);
        let hash_map =
            class_graph.add_class(ClassData::new(BinaryName::HASHMAP, abstract_map, false));
        hash_map.interfaces.push(map);
        hash_map.interfaces.push(lang.cloneable);

        UtilClasses {
            collection,
            list,
            set,
            map,
            abstract_collection,
            abstract_list,
            abstract_set,
            abstract_map,
            array_list,
            hash_set,
            hash_map,
        }
    }
}
