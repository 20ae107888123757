use thiserror::Error;

/// Fatal conditions of a graphing run. All of them stop the run.
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("{0}")]
    Usage(String),

    #[error(
        "Invalid field specifier {0}\nYou need to specify fields as MSGNAME.fieldname[:modifier,...], for example ATT.Pitch or ATT.Roll:degrees,2"
    )]
    InvalidSpecifier(String),

    #[error("Unknown type '{modifier}' in field specifier {specifier}")]
    UnknownModifier { modifier: String, specifier: String },

    #[error("Message {message_type} has no field named '{field}'")]
    MissingField { message_type: String, field: String },

    #[error("Field {message_type}.{field} is not numeric (value: {value})")]
    NonNumericField {
        message_type: String,
        field: String,
        value: String,
    },
}
