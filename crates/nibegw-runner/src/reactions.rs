//! Automatic writes triggered by observed values.
//!
//! The stock rule clears alarm 251 by writing the alarm reset register, which
//! the heat pump raises whenever an accessory drops off the bus for a while.

use nibegw_model::Value;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::event_loop::EngineCommand;
use crate::events::ValueEvent;

/// When item `when` reports `equals`, write `value` to item `write`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    /// Item to watch.
    pub when: String,
    /// Value that triggers the write.
    pub equals: Value,
    /// Item to write.
    pub write: String,
    /// Value to write.
    pub value: Value,
}

impl Reaction {
    fn matches(&self, event: &ValueEvent) -> bool {
        if event.name != self.when {
            return false;
        }
        match (&self.equals, &event.value) {
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// An ordered set of reactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reactions(Vec<Reaction>);

impl Default for Reactions {
    fn default() -> Self {
        Reactions(vec![Reaction {
            when: "alarm-45001".to_string(),
            equals: Value::Int(251),
            write: "alarm-reset-45171".to_string(),
            value: Value::Int(1),
        }])
    }
}

impl Reactions {
    /// Wrap a list of reactions.
    pub fn new(reactions: Vec<Reaction>) -> Self {
        Reactions(reactions)
    }

    /// No reactions at all.
    pub fn none() -> Self {
        Reactions(Vec::new())
    }

    /// Commands triggered by `event`, in rule order.
    pub fn apply(&self, event: &ValueEvent) -> Vec<EngineCommand> {
        self.0
            .iter()
            .filter(|r| r.matches(event))
            .map(|r| {
                info!("{} = {}: writing {} = {}", r.when, event.value, r.write, r.value);
                EngineCommand::Write {
                    name: r.write.clone(),
                    value: r.value.to_json(),
                }
            })
            .collect()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Provenance;

    fn event(name: &str, value: Value) -> ValueEvent {
        ValueEvent {
            name: name.to_string(),
            address: 0,
            value,
            provenance: Provenance::Broadcast,
            invalid: None,
        }
    }

    #[test]
    fn test_alarm_reset() {
        let reactions = Reactions::default();

        let commands = reactions.apply(&event("alarm-45001", Value::Int(251)));
        assert_eq!(
            commands,
            vec![EngineCommand::Write {
                name: "alarm-reset-45171".to_string(),
                value: serde_json::json!(1),
            }]
        );

        assert!(reactions.apply(&event("alarm-45001", Value::Int(0))).is_empty());
        assert!(reactions.apply(&event("other-1", Value::Int(251))).is_empty());
    }

    #[test]
    fn test_numeric_and_label_comparison() {
        let reactions = Reactions::new(vec![
            Reaction {
                when: "temp".to_string(),
                equals: Value::Int(20),
                write: "a".to_string(),
                value: Value::Int(1),
            },
            Reaction {
                when: "mode".to_string(),
                equals: Value::from("LUXURY"),
                write: "b".to_string(),
                value: Value::from("ECONOMY"),
            },
        ]);

        assert_eq!(reactions.apply(&event("temp", Value::Float(20.0))).len(), 1);
        assert_eq!(reactions.apply(&event("mode", Value::from("LUXURY"))).len(), 1);
        assert!(reactions.apply(&event("mode", Value::Int(2))).is_empty());
    }

    #[test]
    fn test_yaml() {
        let reactions: Reactions = serde_yaml::from_str(
            "- {when: alarm-45001, equals: 251, write: alarm-reset-45171, value: 1}",
        )
        .unwrap();
        assert_eq!(reactions, Reactions::default());
    }
}
