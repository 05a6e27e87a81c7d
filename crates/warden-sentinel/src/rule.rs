use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimal rule tree interpreter (spec §4.4.1: "the exact DSL is out of
/// scope; implementers may substitute a minimal tree interpreter provided
/// the contract holds: deterministic, side-effect-free, pure function of
/// rule and input"). Stored as `Policy::rule` (a `serde_json::Value`) and
/// parsed into this shape at evaluation time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Rule {
    And { rules: Vec<Rule> },
    Or { rules: Vec<Rule> },
    Not { rule: Box<Rule> },
    Eq { path: String, value: Value },
    Regex { path: String, pattern: String },
    SetMembership { path: String, set: Vec<Value> },
    NumericCompare { path: String, cmp: CompareOp, value: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Lt => lhs < rhs,
            CompareOp::Lte => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Gte => lhs >= rhs,
        }
    }
}

/// Dot-separated path lookup into a JSON value (`"actor.roles"`,
/// `"resource.amount"`). No array indexing — the inputs to a decision are
/// shallow records, not arbitrary documents.
fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Result of evaluating a rule against one decision input: whether it
/// matched, what evidence backs that verdict, and a human-readable
/// explanation (spec §4.4.1: `{match, evidence, explanation}`).
#[derive(Clone, Debug, Serialize)]
pub struct EvalOutcome {
    pub matched: bool,
    pub evidence: Value,
    pub explanation: String,
}

/// Evaluate `rule` against `input`. Pure and side-effect-free: the same
/// `(rule, input)` pair always produces the same outcome.
pub fn evaluate(rule: &Rule, input: &Value) -> EvalOutcome {
    match rule {
        Rule::And { rules } => {
            let children: Vec<EvalOutcome> = rules.iter().map(|r| evaluate(r, input)).collect();
            let matched = children.iter().all(|c| c.matched);
            combine("and", matched, children)
        }
        Rule::Or { rules } => {
            let children: Vec<EvalOutcome> = rules.iter().map(|r| evaluate(r, input)).collect();
            let matched = children.iter().any(|c| c.matched);
            combine("or", matched, children)
        }
        Rule::Not { rule } => {
            let inner = evaluate(rule, input);
            EvalOutcome {
                matched: !inner.matched,
                evidence: inner.evidence.clone(),
                explanation: format!("not({})", inner.explanation),
            }
        }
        Rule::Eq { path, value } => {
            let found = resolve_path(input, path);
            let matched = found == Some(value);
            EvalOutcome {
                matched,
                evidence: serde_json::json!({"path": path, "found": found}),
                explanation: format!("{path} == {value}"),
            }
        }
        Rule::Regex { path, pattern } => {
            let found = resolve_path(input, path).and_then(Value::as_str);
            let matched = match (found, regex::Regex::new(pattern)) {
                (Some(s), Ok(re)) => re.is_match(s),
                _ => false,
            };
            EvalOutcome {
                matched,
                evidence: serde_json::json!({"path": path, "found": found}),
                explanation: format!("{path} =~ /{pattern}/"),
            }
        }
        Rule::SetMembership { path, set } => {
            let found = resolve_path(input, path);
            let matched = found.is_some_and(|v| set.contains(v));
            EvalOutcome {
                matched,
                evidence: serde_json::json!({"path": path, "found": found}),
                explanation: format!("{path} in {set:?}"),
            }
        }
        Rule::NumericCompare { path, cmp, value } => {
            let found = resolve_path(input, path).and_then(Value::as_f64);
            let matched = found.is_some_and(|f| cmp.apply(f, *value));
            EvalOutcome {
                matched,
                evidence: serde_json::json!({"path": path, "found": found}),
                explanation: format!("{path} {cmp:?} {value}"),
            }
        }
    }
}

fn combine(op: &str, matched: bool, children: Vec<EvalOutcome>) -> EvalOutcome {
    let explanation = format!(
        "{op}({})",
        children.iter().map(|c| c.explanation.clone()).collect::<Vec<_>>().join(", ")
    );
    let evidence = Value::Array(children.into_iter().map(|c| c.evidence).collect());
    EvalOutcome { matched, evidence, explanation }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_matches_nested_path() {
        let rule = Rule::Eq { path: "actor.type".to_string(), value: json!("service") };
        let input = json!({"actor": {"type": "service"}});
        assert!(evaluate(&rule, &input).matched);
    }

    #[test]
    fn and_requires_all_children() {
        let rule = Rule::And {
            rules: vec![
                Rule::Eq { path: "a".to_string(), value: json!(1) },
                Rule::Eq { path: "b".to_string(), value: json!(2) },
            ],
        };
        assert!(evaluate(&rule, &json!({"a": 1, "b": 2})).matched);
        assert!(!evaluate(&rule, &json!({"a": 1, "b": 3})).matched);
    }

    #[test]
    fn not_inverts_child() {
        let rule = Rule::Not {
            rule: Box::new(Rule::Eq { path: "a".to_string(), value: json!(1) }),
        };
        assert!(!evaluate(&rule, &json!({"a": 1})).matched);
        assert!(evaluate(&rule, &json!({"a": 2})).matched);
    }

    #[test]
    fn numeric_compare_gte() {
        let rule = Rule::NumericCompare { path: "amount".to_string(), cmp: CompareOp::Gte, value: 100.0 };
        assert!(evaluate(&rule, &json!({"amount": 150})).matched);
        assert!(!evaluate(&rule, &json!({"amount": 50})).matched);
    }

    #[test]
    fn set_membership() {
        let rule = Rule::SetMembership {
            path: "actor.roles".to_string(),
            set: vec![json!("admin"), json!("auditor")],
        };
        assert!(evaluate(&rule, &json!({"actor": {"roles": "admin"}})).matched);
        assert!(!evaluate(&rule, &json!({"actor": {"roles": "guest"}})).matched);
    }

    #[test]
    fn missing_path_never_matches() {
        let rule = Rule::Eq { path: "missing.field".to_string(), value: json!(1) };
        assert!(!evaluate(&rule, &json!({})).matched);
    }
}
