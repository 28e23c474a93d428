//! Directive grammar
//!
//! Attribute names select a directive family by prefix:
//!
//! | prefix | family      | meaning                                   |
//! |--------|-------------|-------------------------------------------|
//! | `s-`   | State       | two-way state binding with handler chain  |
//! | `v-`   | View        | one-way render binding                    |
//! | `c-`   | Control     | event action with an optional operator    |
//! | `f-`   | Conditional | visibility from a truthiness path         |
//! | `l-`   | List        | template repetition over a list key       |
//!
//! Attribute values parse into either a [`StateExpr`]
//! (`"event|handlerA&handlerB#handlerC"`) or a [`ControlExpr`]
//! (`"action<op>details"`). Parsing is pure; interpretation lives in the
//! compiler.

use weft_core::{ElementId, Result, WeftError};

/// Directive family, selected by attribute prefix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectiveFamily {
    State,
    View,
    Control,
    Conditional,
    List,
}

impl DirectiveFamily {
    /// Split a directive attribute into `(family, name)`
    ///
    /// Returns `None` for attributes outside the directive namespace; a
    /// recognized prefix with an empty name is also not a directive.
    pub fn from_attribute(attribute: &str) -> Option<(Self, &str)> {
        let prefix = attribute.get(..2)?;
        let name = &attribute[2..];
        let family = match prefix {
            "s-" => Self::State,
            "v-" => Self::View,
            "c-" => Self::Control,
            "f-" => Self::Conditional,
            "l-" => Self::List,
            _ => return None,
        };
        if name.is_empty() {
            return None;
        }
        Some((family, name))
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::State => "s-",
            Self::View => "v-",
            Self::Control => "c-",
            Self::Conditional => "f-",
            Self::List => "l-",
        }
    }
}

/// One directive lifted off an element attribute
#[derive(Clone, Debug)]
pub struct Directive {
    pub family: DirectiveFamily,
    pub element: ElementId,
    /// Name portion after the family prefix (usually a state key)
    pub name: String,
    /// Raw attribute value
    pub expr: String,
}

/// Chain operator
///
/// `SoftStop` and `HardStop` may appear between state-chain stages; the
/// full set is legal after a control action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainOp {
    /// `&` - halt silently when the preceding output is invalid
    SoftStop,
    /// `#` - raise when the preceding output is invalid
    HardStop,
    /// `:` - pass trailing details to the action as `actionDetails`
    Detail,
    /// `>` - dispatch the result on the bus
    Dispatch,
    /// `*` - dispatch the result on several bus events
    Broadcast,
    /// `@` - action returns a deferred; dispatch when it settles
    AsyncDispatch,
    /// `<` - rebind: attach a second handler for another event
    Rebind,
}

impl ChainOp {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '&' => Some(Self::SoftStop),
            '#' => Some(Self::HardStop),
            ':' => Some(Self::Detail),
            '>' => Some(Self::Dispatch),
            '*' => Some(Self::Broadcast),
            '@' => Some(Self::AsyncDispatch),
            '<' => Some(Self::Rebind),
            _ => None,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Self::SoftStop => '&',
            Self::HardStop => '#',
            Self::Detail => ':',
            Self::Dispatch => '>',
            Self::Broadcast => '*',
            Self::AsyncDispatch => '@',
            Self::Rebind => '<',
        }
    }
}

/// One stage of a state handler chain
///
/// `op` is the operator written after this stage's handler; the final
/// stage carries `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainStage {
    pub handler: String,
    pub op: Option<ChainOp>,
}

/// Parsed state-directive value: `"event|handlerA&handlerB"`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateExpr {
    pub event: String,
    pub chain: Vec<ChainStage>,
}

/// Parsed control-directive value: `"action<op>details"`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlExpr {
    pub action: String,
    pub op: Option<ChainOp>,
    pub details: Option<String>,
}

fn is_handler_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse a state-directive value
///
/// Without a `|` the whole value is the chain and the event falls back to
/// `default_event`. An empty value yields an empty chain (the binding is
/// render-only).
pub fn parse_state_expr(raw: &str, default_event: &str) -> Result<StateExpr> {
    let raw = raw.trim();
    let (event, chain_src) = match raw.split_once('|') {
        Some((event, chain)) => (event.trim(), chain.trim()),
        None => (default_event, raw),
    };
    if event.is_empty() {
        return Err(WeftError::InvalidName);
    }

    let mut chain = Vec::new();
    if !chain_src.is_empty() {
        let mut handler = String::new();
        for c in chain_src.chars() {
            if is_handler_char(c) {
                handler.push(c);
            } else if c == '&' || c == '#' {
                if handler.is_empty() {
                    return Err(WeftError::InvalidName);
                }
                let op = if c == '&' {
                    ChainOp::SoftStop
                } else {
                    ChainOp::HardStop
                };
                chain.push(ChainStage {
                    handler: std::mem::take(&mut handler),
                    op: Some(op),
                });
            } else if !c.is_whitespace() {
                return Err(WeftError::UnknownOperator(c));
            }
        }
        if handler.is_empty() {
            // value ended on an operator
            return Err(WeftError::InvalidName);
        }
        chain.push(ChainStage { handler, op: None });
    }

    Ok(StateExpr {
        event: event.to_string(),
        chain,
    })
}

/// Parse a control-directive value
pub fn parse_control_expr(raw: &str) -> Result<ControlExpr> {
    let raw = raw.trim();
    let op_at = raw.char_indices().find(|(_, c)| ChainOp::from_char(*c).is_some());

    let Some((index, op_char)) = op_at else {
        if raw.is_empty() {
            return Err(WeftError::NotCallable(String::new()));
        }
        return Ok(ControlExpr {
            action: raw.to_string(),
            op: None,
            details: None,
        });
    };

    let action = raw[..index].trim();
    if action.is_empty() {
        return Err(WeftError::NotCallable(String::new()));
    }
    let details = raw[index + op_char.len_utf8()..].trim();

    Ok(ControlExpr {
        action: action.to_string(),
        op: ChainOp::from_char(op_char),
        details: (!details.is_empty()).then(|| details.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_attribute() {
        assert_eq!(
            DirectiveFamily::from_attribute("s-count"),
            Some((DirectiveFamily::State, "count"))
        );
        assert_eq!(
            DirectiveFamily::from_attribute("l-todos"),
            Some((DirectiveFamily::List, "todos"))
        );
        assert_eq!(DirectiveFamily::from_attribute("s-"), None);
        assert_eq!(DirectiveFamily::from_attribute("x-count"), None);
        assert_eq!(DirectiveFamily::from_attribute("class"), None);
        assert_eq!(DirectiveFamily::from_attribute("s"), None);
    }

    #[test]
    fn test_state_expr_with_event_and_chain() {
        let expr = parse_state_expr("change|validate&normalize#commit", "input").unwrap();
        assert_eq!(expr.event, "change");
        assert_eq!(
            expr.chain,
            vec![
                ChainStage {
                    handler: "validate".to_string(),
                    op: Some(ChainOp::SoftStop),
                },
                ChainStage {
                    handler: "normalize".to_string(),
                    op: Some(ChainOp::HardStop),
                },
                ChainStage {
                    handler: "commit".to_string(),
                    op: None,
                },
            ]
        );
    }

    #[test]
    fn test_state_expr_defaults() {
        let expr = parse_state_expr("trim", "input").unwrap();
        assert_eq!(expr.event, "input");
        assert_eq!(expr.chain.len(), 1);
        assert_eq!(expr.chain[0].handler, "trim");

        let bare = parse_state_expr("", "input").unwrap();
        assert_eq!(bare.event, "input");
        assert!(bare.chain.is_empty());

        let event_only = parse_state_expr("change|", "input").unwrap();
        assert_eq!(event_only.event, "change");
        assert!(event_only.chain.is_empty());
    }

    #[test]
    fn test_state_expr_rejects_stray_operators() {
        assert!(matches!(
            parse_state_expr("change|validate>save", "input"),
            Err(WeftError::UnknownOperator('>'))
        ));
        assert!(matches!(
            parse_state_expr("change|&save", "input"),
            Err(WeftError::InvalidName)
        ));
        assert!(matches!(
            parse_state_expr("change|save&", "input"),
            Err(WeftError::InvalidName)
        ));
        assert!(matches!(
            parse_state_expr("|save", "input"),
            Err(WeftError::InvalidName)
        ));
    }

    #[test]
    fn test_control_expr_forms() {
        let plain = parse_control_expr("save").unwrap();
        assert_eq!(plain.action, "save");
        assert_eq!(plain.op, None);
        assert_eq!(plain.details, None);

        let detail = parse_control_expr("save:draft").unwrap();
        assert_eq!(detail.op, Some(ChainOp::Detail));
        assert_eq!(detail.details.as_deref(), Some("draft"));

        let dispatch = parse_control_expr("save>saved").unwrap();
        assert_eq!(dispatch.op, Some(ChainOp::Dispatch));
        assert_eq!(dispatch.details.as_deref(), Some("saved"));

        let broadcast = parse_control_expr("save*saved,logged").unwrap();
        assert_eq!(broadcast.op, Some(ChainOp::Broadcast));
        assert_eq!(broadcast.details.as_deref(), Some("saved,logged"));

        let rebind = parse_control_expr("arm<click:disarm").unwrap();
        assert_eq!(rebind.op, Some(ChainOp::Rebind));
        assert_eq!(rebind.details.as_deref(), Some("click:disarm"));
    }

    #[test]
    fn test_control_expr_rejects_empty_action() {
        assert!(matches!(
            parse_control_expr(""),
            Err(WeftError::NotCallable(_))
        ));
        assert!(matches!(
            parse_control_expr(">saved"),
            Err(WeftError::NotCallable(_))
        ));
    }
}
