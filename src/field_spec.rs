use std::{f64::consts::PI, fmt, str::FromStr};

use serde::Serialize;

use crate::error::GraphError;

/// Radians to degrees.
pub const DEGREES_MULTIPLIER: f64 = 360.0 / (2.0 * PI);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    Primary,
    Secondary,
}

impl Axis {
    pub fn number(self) -> u8 {
        match self {
            Axis::Primary => 1,
            Axis::Secondary => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Modifier {
    Scale(f64),
    Route(Axis),
}

const MODIFIERS: &[(&str, Modifier)] = &[
    ("degrees", Modifier::Scale(DEGREES_MULTIPLIER)),
    ("2", Modifier::Route(Axis::Secondary)),
];

/// One `MSGNAME.fieldname[:modifier,...]` token from the command line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub message_type: String,
    pub field_name: String,
    pub multiplier: f64,
    pub axis: Axis,
    #[serde(rename = "label")]
    token: String,
}

impl FieldSpec {
    pub fn parse(token: &str) -> Result<Self, GraphError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [message_type, rest] = parts[..] else {
            return Err(GraphError::InvalidSpecifier(token.to_string()));
        };

        let (field_name, modifiers) = match rest.split_once(':') {
            Some((name, list)) => (name, Some(list)),
            None => (rest, None),
        };

        // one modifier list at most: "A.b:degrees:2" is malformed, not an unknown modifier
        let extra_list = modifiers.is_some_and(|list| list.contains(':'));
        if message_type.is_empty() || field_name.is_empty() || extra_list {
            return Err(GraphError::InvalidSpecifier(token.to_string()));
        }

        let mut spec = FieldSpec {
            message_type: message_type.to_string(),
            field_name: field_name.to_string(),
            multiplier: 1.0,
            axis: Axis::Primary,
            token: token.to_string(),
        };

        for tag in modifiers.into_iter().flat_map(|list| list.split(',')) {
            match MODIFIERS.iter().find(|(name, _)| *name == tag) {
                Some((_, Modifier::Scale(factor))) => spec.multiplier = *factor,
                Some((_, Modifier::Route(axis))) => spec.axis = *axis,
                None => {
                    return Err(GraphError::UnknownModifier {
                        modifier: tag.to_string(),
                        specifier: token.to_string(),
                    })
                }
            }
        }

        Ok(spec)
    }

    /// The token as given by the user, used as the legend label.
    pub fn label(&self) -> &str {
        &self.token
    }
}

impl FromStr for FieldSpec {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldSpec::parse(s)
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token)
    }
}
