use super::class_file::Constant;

/// Errors that can occur while growing the constant pool
#[derive(Debug)]
pub enum Error {
    /// Constant pool ran out of its 65535 slots
    ConstantPoolOverflow { constant: Constant, offset: u16 },

    /// `BootstrapMethods` attribute ran out of its 65535 entries
    BootstrapMethodsOverflow,

    IoError(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
