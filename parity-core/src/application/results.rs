// parity-core/src/application/results.rs

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

use crate::domain::error::DomainError;
use crate::domain::rule::RuleDefinition;
use crate::domain::verdict::{RunSummary, Verdict, VerdictStatus};

/// Lifecycle of one rule within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Pending,
    Running,
    Finished(VerdictStatus),
}

impl RuleState {
    pub fn can_transition_to(&self, next: &RuleState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Finished(_))
        )
    }
}

impl fmt::Display for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("PENDING"),
            Self::Running => f.write_str("RUNNING"),
            Self::Finished(status) => write!(f, "FINISHED({})", status),
        }
    }
}

/// Collects verdicts in completion order and tracks which rules ran.
#[derive(Debug)]
pub struct ResultAggregator {
    order: Vec<String>,
    states: HashMap<String, RuleState>,
    verdicts: Vec<Verdict>,
}

impl ResultAggregator {
    pub fn new(rules: &[RuleDefinition]) -> Self {
        Self {
            order: rules.iter().map(|r| r.rule_id.clone()).collect(),
            states: rules
                .iter()
                .map(|r| (r.rule_id.clone(), RuleState::Pending))
                .collect(),
            verdicts: Vec::new(),
        }
    }

    pub fn state(&self, rule_id: &str) -> Option<RuleState> {
        self.states.get(rule_id).copied()
    }

    fn transition(&mut self, rule_id: &str, next: RuleState) -> Result<(), DomainError> {
        let current = self.states.get(rule_id).copied();
        match current {
            Some(state) if state.can_transition_to(&next) => {
                self.states.insert(rule_id.to_string(), next);
                Ok(())
            }
            other => Err(DomainError::IllegalTransition {
                rule_id: rule_id.to_string(),
                from: other.map(|s| s.to_string()).unwrap_or_else(|| "UNKNOWN".into()),
                to: next.to_string(),
            }),
        }
    }

    pub fn start(&mut self, rule_id: &str) -> Result<(), DomainError> {
        self.transition(rule_id, RuleState::Running)
    }

    /// Records every verdict a rule produced; the rule's final status is the
    /// worst of them.
    pub fn finish(&mut self, rule_id: &str, verdicts: Vec<Verdict>) -> Result<(), DomainError> {
        let status = VerdictStatus::reduce(verdicts.iter().map(Verdict::status));
        self.transition(rule_id, RuleState::Finished(status))?;
        self.verdicts.extend(verdicts);
        Ok(())
    }

    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    /// Rules that never reached `Finished`, in declaration order.
    pub fn not_evaluated(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| !matches!(self.states.get(*id), Some(RuleState::Finished(_))))
            .cloned()
            .collect()
    }

    pub fn summary(&self, cancelled: bool, started_at: DateTime<Utc>) -> RunSummary {
        RunSummary::new(
            self.verdicts.clone(),
            self.not_evaluated(),
            cancelled,
            started_at,
        )
    }

    pub fn into_summary(self, cancelled: bool, started_at: DateTime<Utc>) -> RunSummary {
        let not_evaluated = self.not_evaluated();
        RunSummary::new(self.verdicts, not_evaluated, cancelled, started_at)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn rule(id: &str) -> RuleDefinition {
        serde_yaml::from_str(&format!(
            "rule_id: {id}\ncheck_kind: \"null\"\ntable: customers\ncolumn: email\n"
        ))
        .unwrap()
    }

    #[test]
    fn test_lifecycle_is_forward_only() {
        let rules = vec![rule("A")];
        let mut agg = ResultAggregator::new(&rules);
        assert!(agg.finish("A", vec![]).is_err());
        agg.start("A").unwrap();
        assert!(agg.start("A").is_err());
        agg.finish("A", vec![Verdict::error(&rules[0], "QueryExecutionError", "boom")])
            .unwrap();
        assert_eq!(
            agg.state("A"),
            Some(RuleState::Finished(VerdictStatus::Error))
        );
        assert!(matches!(
            agg.start("A"),
            Err(DomainError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn test_unknown_rule_is_rejected() {
        let mut agg = ResultAggregator::new(&[rule("A")]);
        assert!(agg.start("B").is_err());
    }

    #[test]
    fn test_unfinished_rules_are_not_evaluated() {
        let rules = vec![rule("A"), rule("B"), rule("C")];
        let mut agg = ResultAggregator::new(&rules);
        agg.start("B").unwrap();
        agg.finish("B", vec![Verdict::error(&rules[1], "Cancelled", "x")])
            .unwrap();
        agg.start("C").unwrap();

        let summary = agg.into_summary(true, Utc::now());
        assert_eq!(summary.not_evaluated, vec!["A".to_string(), "C".to_string()]);
        assert!(summary.is_partial());
        assert_eq!(summary.verdicts.len(), 1);
    }
}
