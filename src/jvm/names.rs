use std::borrow::Cow;
use std::fmt::{Debug, Error as FmtError, Formatter};

/// Names of methods and fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, with `/` separating the package segments
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extract the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extract the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(String::from("Unqualified name is empty"))
        } else if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(UnqualifiedName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(String::from("Binary name is empty"))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(BinaryName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl From<UnqualifiedName> for BinaryName {
    fn from(name: UnqualifiedName) -> BinaryName {
        BinaryName(name.0)
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    /// Is this one of the two special method names with angle brackets?
    pub fn is_initializer(&self) -> bool {
        self == &Self::INIT || self == &Self::CLINIT
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");
}

impl BinaryName {
    /// Join segments from the other name onto the end of this binary name
    pub fn join(&self, other: impl Name) -> BinaryName {
        BinaryName(Cow::Owned(format!("{}/{}", self.as_str(), other.as_str())))
    }

    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // java.lang
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const CHARSEQUENCE: Self = Self::name("java/lang/CharSequence");
    pub const COMPARABLE: Self = Self::name("java/lang/Comparable");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const NUMBER: Self = Self::name("java/lang/Number");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const LONG: Self = Self::name("java/lang/Long");
    pub const FLOAT: Self = Self::name("java/lang/Float");
    pub const DOUBLE: Self = Self::name("java/lang/Double");
    pub const MATH: Self = Self::name("java/lang/Math");
    pub const STRINGBUILDER: Self = Self::name("java/lang/StringBuilder");
    pub const SYSTEM: Self = Self::name("java/lang/System");
    pub const RUNNABLE: Self = Self::name("java/lang/Runnable");

    // java.lang throwables
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
    pub const ERROR: Self = Self::name("java/lang/Error");
    pub const ASSERTIONERROR: Self = Self::name("java/lang/AssertionError");
    pub const EXCEPTION: Self = Self::name("java/lang/Exception");
    pub const RUNTIMEEXCEPTION: Self = Self::name("java/lang/RuntimeException");
    pub const ARITHMETICEXCEPTION: Self = Self::name("java/lang/ArithmeticException");
    pub const ILLEGALARGUMENTEXCEPTION: Self = Self::name("java/lang/IllegalArgumentException");
    pub const ILLEGALSTATEEXCEPTION: Self = Self::name("java/lang/IllegalStateException");
    pub const NULLPOINTEREXCEPTION: Self = Self::name("java/lang/NullPointerException");

    // java.lang.invoke
    pub const CALLSITE: Self = Self::name("java/lang/invoke/CallSite");
    pub const METHODHANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
    pub const METHODHANDLES_LOOKUP: Self = Self::name("java/lang/invoke/MethodHandles$Lookup");
    pub const METHODTYPE: Self = Self::name("java/lang/invoke/MethodType");

    // java.io / java.util
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");
    pub const PRINTSTREAM: Self = Self::name("java/io/PrintStream");
    pub const ITERABLE: Self = Self::name("java/lang/Iterable");
    pub const COLLECTION: Self = Self::name("java/util/Collection");
    pub const LIST: Self = Self::name("java/util/List");
    pub const SET: Self = Self::name("java/util/Set");
    pub const MAP: Self = Self::name("java/util/Map");
    pub const ABSTRACTCOLLECTION: Self = Self::name("java/util/AbstractCollection");
    pub const ABSTRACTLIST: Self = Self::name("java/util/AbstractList");
    pub const ABSTRACTSET: Self = Self::name("java/util/AbstractSet");
    pub const ABSTRACTMAP: Self = Self::name("java/util/AbstractMap");
    pub const ARRAYLIST: Self = Self::name("java/util/ArrayList");
    pub const HASHSET: Self = Self::name("java/util/HashSet");
    pub const HASHMAP: Self = Self::name("java/util/HashMap");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn valid_unqualified_names() {
        assert!(UnqualifiedName::check_valid("foo").is_ok());
        assert!(UnqualifiedName::check_valid("<init>").is_ok());
        assert!(UnqualifiedName::check_valid("lambda$main$0").is_ok());
    }

    #[test]
    fn invalid_unqualified_names() {
        assert!(UnqualifiedName::check_valid("").is_err());
        assert!(UnqualifiedName::check_valid("foo.bar").is_err());
        assert!(UnqualifiedName::check_valid("foo;").is_err());
        assert!(UnqualifiedName::check_valid("[foo").is_err());
        assert!(UnqualifiedName::check_valid("foo/bar").is_err());
    }

    #[test]
    fn valid_binary_names() {
        assert!(BinaryName::check_valid("Example").is_ok());
        assert!(BinaryName::check_valid("java/lang/Object").is_ok());
        assert!(BinaryName::check_valid("me/example/Inner$1").is_ok());
    }

    #[test]
    fn invalid_binary_names() {
        assert!(BinaryName::check_valid("").is_err());
        assert!(BinaryName::check_valid("java/lang/").is_err());
        assert!(BinaryName::check_valid("/java").is_err());
        assert!(BinaryName::check_valid("java.lang.Object").is_err());
        assert!(BinaryName::check_valid("Ljava/lang/Object;").is_err());
    }
}
