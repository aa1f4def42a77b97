//! The rule language attached to bundle commands.
//!
//! A rule is a predicate over a parsed invocation:
//!
//! ```text
//! allow
//! must have bundle:permission
//! with arg[0] == "production" must have deploy:production_deploy
//! ```
//!
//! A rule *fires* when its guard holds; guard-less rules always fire.
//! A command is permitted iff its rule list is non-empty and every fired
//! rule's permission requirement is met. `allow` carries no requirement
//! and exists so a command can opt out of the default-deny.

use std::collections::HashSet;

use gort_domain::{Error, Result};

use crate::infer::Value;

/// Guard clause: positional argument equality.
#[derive(Clone, Debug, PartialEq)]
pub struct Guard {
    pub arg_index: usize,
    pub value: String,
}

/// One parsed rule expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub guard: Option<Guard>,
    /// Fully qualified `bundle:permission`; `None` for an `allow` rule.
    pub permission: Option<String>,
    pub raw: String,
}

impl Rule {
    /// Parse a rule expression. An unqualified permission name is
    /// qualified with `bundle` (the bundle the rule is declared in).
    pub fn parse(bundle: &str, raw: &str) -> Result<Self> {
        let tokens: Vec<&str> = raw.split_whitespace().collect();

        let (guard, rest) = if tokens.first() == Some(&"with") {
            let (guard, consumed) = parse_guard(raw, &tokens)?;
            (Some(guard), &tokens[consumed..])
        } else {
            (None, &tokens[..])
        };

        match rest {
            ["allow"] => Ok(Rule {
                guard,
                permission: None,
                raw: raw.to_owned(),
            }),
            ["must", "have", permission] => {
                let permission = if permission.contains(':') {
                    (*permission).to_owned()
                } else {
                    format!("{bundle}:{permission}")
                };
                Ok(Rule {
                    guard,
                    permission: Some(permission),
                    raw: raw.to_owned(),
                })
            }
            _ => Err(Error::Unmarshal(format!("malformed rule: {raw}"))),
        }
    }

    /// Whether this rule's guard holds for the given argument list.
    pub fn fires(&self, args: &[Value]) -> bool {
        match &self.guard {
            None => true,
            Some(guard) => args
                .get(guard.arg_index)
                .map(|v| v.as_text() == guard.value)
                .unwrap_or(false),
        }
    }
}

/// Parse `with arg[i] == <value>`, returning the guard and the number of
/// leading tokens it consumed.
fn parse_guard(raw: &str, tokens: &[&str]) -> Result<(Guard, usize)> {
    match tokens {
        ["with", subject, "==", value, ..] => {
            let arg_index = subject
                .strip_prefix("arg[")
                .and_then(|s| s.strip_suffix(']'))
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| Error::Unmarshal(format!("malformed rule guard: {raw}")))?;
            Ok((
                Guard {
                    arg_index,
                    value: unquote(value),
                },
                4,
            ))
        }
        _ => Err(Error::Unmarshal(format!("malformed rule guard: {raw}"))),
    }
}

fn unquote(s: &str) -> String {
    let stripped = s
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
    stripped.unwrap_or(s).to_owned()
}

/// Parse every rule expression declared by a command.
pub fn parse_rules(bundle: &str, raw_rules: &[String]) -> Result<Vec<Rule>> {
    raw_rules.iter().map(|r| Rule::parse(bundle, r)).collect()
}

/// Evaluate a rule list against the invocation arguments and the user's
/// flattened permission set (`bundle:permission` strings).
///
/// An empty rule list denies by default.
pub fn evaluate(rules: &[Rule], args: &[Value], permissions: &HashSet<String>) -> bool {
    if rules.is_empty() {
        return false;
    }
    rules
        .iter()
        .filter(|rule| rule.fires(args))
        .all(|rule| match &rule.permission {
            Some(permission) => permissions.contains(permission),
            None => true,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<Value> {
        values
            .iter()
            .map(|v| Value::String {
                text: (*v).to_owned(),
                quote: '\u{0}',
            })
            .collect()
    }

    fn perms(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| (*v).to_owned()).collect()
    }

    #[test]
    fn unconditional_rule_parses() {
        let rule = Rule::parse("echo", "must have echo:can_echo").unwrap();
        assert!(rule.guard.is_none());
        assert_eq!(rule.permission.as_deref(), Some("echo:can_echo"));
    }

    #[test]
    fn unqualified_permission_gains_bundle_prefix() {
        let rule = Rule::parse("echo", "must have can_echo").unwrap();
        assert_eq!(rule.permission.as_deref(), Some("echo:can_echo"));
    }

    #[test]
    fn allow_rule_permits_without_permissions() {
        let rules = parse_rules("gort", &["allow".to_owned()]).unwrap();
        assert!(evaluate(&rules, &[], &perms(&[])));
    }

    #[test]
    fn guarded_rule_parses() {
        let rule = Rule::parse(
            "deploy",
            "with arg[0] == \"production\" must have deploy:production_deploy",
        )
        .unwrap();
        let guard = rule.guard.unwrap();
        assert_eq!(guard.arg_index, 0);
        assert_eq!(guard.value, "production");
    }

    #[test]
    fn malformed_rules_are_rejected() {
        assert!(Rule::parse("b", "must want x").is_err());
        assert!(Rule::parse("b", "with arg[x] == y must have b:p").is_err());
        assert!(Rule::parse("b", "").is_err());
    }

    #[test]
    fn empty_rule_list_denies() {
        assert!(!evaluate(&[], &args(&["x"]), &perms(&["b:p"])));
    }

    #[test]
    fn guarded_production_deploy_scenario() {
        let rules = parse_rules(
            "deploy",
            &["with arg[0] == \"production\" must have deploy:production_deploy".to_owned()],
        )
        .unwrap();

        // Without the permission, deploying to production is denied.
        assert!(!evaluate(&rules, &args(&["production"]), &perms(&[])));
        // The guard does not fire for staging, so the invocation passes.
        assert!(evaluate(&rules, &args(&["staging"]), &perms(&[])));
        // With the permission granted, production is allowed.
        assert!(evaluate(
            &rules,
            &args(&["production"]),
            &perms(&["deploy:production_deploy"])
        ));
    }

    #[test]
    fn all_fired_rules_must_be_satisfied() {
        let rules = parse_rules(
            "ops",
            &[
                "must have ops:run".to_owned(),
                "with arg[0] == \"prod\" must have ops:prod".to_owned(),
            ],
        )
        .unwrap();

        assert!(evaluate(&rules, &args(&["dev"]), &perms(&["ops:run"])));
        assert!(!evaluate(&rules, &args(&["prod"]), &perms(&["ops:run"])));
        assert!(evaluate(
            &rules,
            &args(&["prod"]),
            &perms(&["ops:run", "ops:prod"])
        ));
    }

    #[test]
    fn guard_compares_typed_arguments_textually() {
        let rules =
            parse_rules("calc", &["with arg[0] == 3 must have calc:three".to_owned()]).unwrap();
        assert!(!evaluate(&rules, &[Value::Int(3)], &perms(&[])));
        assert!(evaluate(&rules, &[Value::Int(4)], &perms(&[])));
    }
}
