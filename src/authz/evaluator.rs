use std::fmt;

use async_trait::async_trait;

use super::request::AccessRequest;
use super::verdict::Verdict;
use crate::errors::AppResult;
use crate::models::permission::{Capability, Grant};

/// Read access to everything a decision depends on.
///
/// Errors are returned as-is; the evaluator never turns a failed lookup into a deny.
#[async_trait]
pub trait GrantSource: Send + Sync {
    /// Fails with `NotFound` for names absent from the catalog.
    async fn capability(&self, name: &str) -> AppResult<Capability>;
    async fn subject_grants(&self, actor_id: i64, capability: &str) -> AppResult<Vec<Grant>>;
    /// Group ids in ascending order.
    async fn groups_of(&self, actor_id: i64) -> AppResult<Vec<i64>>;
    async fn group_grants(&self, group_id: i64, capability: &str) -> AppResult<Vec<Grant>>;
}

/// Which step of the resolution produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionBasis {
    Subject,
    SelfScope,
    Group { group_id: i64 },
    Default,
}

impl fmt::Display for DecisionBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionBasis::Subject => f.write_str("subject"),
            DecisionBasis::SelfScope => f.write_str("self_scope"),
            DecisionBasis::Group { group_id } => write!(f, "group:{group_id}"),
            DecisionBasis::Default => f.write_str("default"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub basis: DecisionBasis,
}

/// Answers whether an actor may use a capability, optionally on one target.
///
/// `decide` returns the outcome together with the rule that produced it and
/// fails with `NotFound` when the capability is not in the catalog. `check` is
/// the same decision reduced to allow/deny.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn decide(&self, request: &AccessRequest) -> AppResult<Decision>;

    async fn check(&self, request: &AccessRequest) -> AppResult<bool> {
        Ok(self.decide(request).await?.allowed)
    }
}

/// Default evaluator over subject grants, group grants and catalog defaults.
///
/// Evaluation order:
/// 1. subject grants (most specific row wins, deny is final) -> decide
/// 2. self-scoped request -> allow
/// 3. group grants, first group with an opinion -> decide
/// 4. capability default
#[derive(Debug, Clone)]
pub struct DefaultPolicyEvaluator<S> {
    source: S,
}

impl<S: GrantSource> DefaultPolicyEvaluator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: GrantSource> PolicyEvaluator for DefaultPolicyEvaluator<S> {
    async fn decide(&self, request: &AccessRequest) -> AppResult<Decision> {
        // Resolved up front so an unknown name fails even when self-scope would allow.
        let capability = self.source.capability(&request.capability).await?;

        let subject_rows = self
            .source
            .subject_grants(request.actor_id, &capability.name)
            .await?;
        let subject = Verdict::resolve(&subject_rows, request.target);

        if subject.is_conclusive() {
            tracing::debug!(
                actor_id = request.actor_id,
                capability = %capability.name,
                target = ?request.target,
                verdict = ?subject,
                "subject grant decided"
            );
            return Ok(Decision {
                allowed: subject == Verdict::Grant,
                basis: DecisionBasis::Subject,
            });
        }

        if request.self_scoped {
            tracing::debug!(
                actor_id = request.actor_id,
                capability = %capability.name,
                "self-scoped request allowed"
            );
            return Ok(Decision {
                allowed: true,
                basis: DecisionBasis::SelfScope,
            });
        }

        for group_id in self.source.groups_of(request.actor_id).await? {
            let rows = self.source.group_grants(group_id, &capability.name).await?;
            let verdict = Verdict::resolve(&rows, request.target);

            if verdict.is_conclusive() {
                tracing::debug!(
                    actor_id = request.actor_id,
                    group_id,
                    capability = %capability.name,
                    target = ?request.target,
                    verdict = ?verdict,
                    "group grant decided"
                );
                return Ok(Decision {
                    allowed: verdict == Verdict::Grant,
                    basis: DecisionBasis::Group { group_id },
                });
            }
        }

        tracing::debug!(
            actor_id = request.actor_id,
            capability = %capability.name,
            default_granted = capability.default_granted,
            "catalog default applied"
        );
        Ok(Decision {
            allowed: capability.default_granted,
            basis: DecisionBasis::Default,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::errors::AppError;
    use crate::models::permission::TargetScope;

    #[derive(Default)]
    struct MemorySource {
        capabilities: HashMap<String, bool>,
        subject: Vec<Grant>,
        group: Vec<Grant>,
        members: BTreeMap<i64, BTreeSet<i64>>,
        group_lookups: AtomicUsize,
        unreachable: bool,
    }

    impl MemorySource {
        fn with_capability(mut self, name: &str, default_granted: bool) -> Self {
            self.capabilities.insert(name.to_string(), default_granted);
            self
        }

        fn subject(mut self, actor: i64, cap: &str, target: TargetScope, enabled: bool, denied: bool) -> Self {
            let id = (self.subject.len() + 1) as i64;
            self.subject.push(grant(id, actor, cap, target, enabled, denied));
            self
        }

        fn group(mut self, group: i64, cap: &str, target: TargetScope, enabled: bool, denied: bool) -> Self {
            let id = (self.group.len() + 1) as i64;
            self.group.push(grant(id, group, cap, target, enabled, denied));
            self
        }

        fn member(mut self, actor: i64, group: i64) -> Self {
            self.members.entry(actor).or_default().insert(group);
            self
        }
    }

    fn grant(id: i64, owner: i64, cap: &str, target: TargetScope, enabled: bool, denied: bool) -> Grant {
        Grant {
            id,
            owner_id: owner,
            capability: cap.to_string(),
            target,
            enabled,
            denied,
        }
    }

    #[async_trait]
    impl GrantSource for MemorySource {
        async fn capability(&self, name: &str) -> AppResult<Capability> {
            if self.unreachable {
                return Err(AppError::Database(sqlx::Error::PoolTimedOut));
            }
            self.capabilities
                .get(name)
                .map(|default_granted| Capability {
                    id: 1,
                    name: name.to_string(),
                    description: String::new(),
                    default_granted: *default_granted,
                })
                .ok_or_else(|| AppError::not_found(format!("capability '{name}' not found")))
        }

        async fn subject_grants(&self, actor_id: i64, capability: &str) -> AppResult<Vec<Grant>> {
            Ok(self
                .subject
                .iter()
                .filter(|g| g.owner_id == actor_id && g.capability == capability)
                .cloned()
                .collect())
        }

        async fn groups_of(&self, actor_id: i64) -> AppResult<Vec<i64>> {
            Ok(self
                .members
                .get(&actor_id)
                .map(|groups| groups.iter().copied().collect())
                .unwrap_or_default())
        }

        async fn group_grants(&self, group_id: i64, capability: &str) -> AppResult<Vec<Grant>> {
            self.group_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .group
                .iter()
                .filter(|g| g.owner_id == group_id && g.capability == capability)
                .cloned()
                .collect())
        }
    }

    fn check(actor: i64, cap: &str, target: Option<i64>) -> AccessRequest {
        AccessRequest::new(actor, cap).on_optional(target)
    }

    #[tokio::test]
    async fn test_default_applies_without_grants() {
        let evaluator = DefaultPolicyEvaluator::new(
            MemorySource::default()
                .with_capability("view_products", true)
                .with_capability("delete_product", false),
        );

        assert!(evaluator.check(&check(1, "view_products", None)).await.unwrap());
        assert!(!evaluator.check(&check(1, "delete_product", Some(3))).await.unwrap());
    }

    #[tokio::test]
    async fn test_subject_deny_all_beats_group_grant() {
        let source = MemorySource::default()
            .with_capability("delete_user", true)
            .subject(1, "delete_user", TargetScope::All, false, true)
            .group(10, "delete_user", TargetScope::All, true, false)
            .member(1, 10);
        let evaluator = DefaultPolicyEvaluator::new(source);

        for target in [None, Some(1), Some(77)] {
            let decision = evaluator.decide(&check(1, "delete_user", target)).await.unwrap();
            assert!(!decision.allowed);
            assert_eq!(decision.basis, DecisionBasis::Subject);
        }
        assert_eq!(evaluator.source().group_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_subject_target_grant_is_scoped() {
        let source = MemorySource::default()
            .with_capability("edit_product", false)
            .subject(1, "edit_product", TargetScope::Id(42), true, false);
        let evaluator = DefaultPolicyEvaluator::new(source);

        assert!(evaluator.check(&check(1, "edit_product", Some(42))).await.unwrap());
        let other = evaluator.decide(&check(1, "edit_product", Some(7))).await.unwrap();
        assert!(!other.allowed);
        assert_eq!(other.basis, DecisionBasis::Default);
    }

    #[tokio::test]
    async fn test_group_grant_allows_member() {
        let source = MemorySource::default()
            .with_capability("edit_product", false)
            .group(5, "edit_product", TargetScope::All, true, false)
            .member(1, 5);
        let evaluator = DefaultPolicyEvaluator::new(source);

        let decision = evaluator.decide(&check(1, "edit_product", Some(99))).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.basis, DecisionBasis::Group { group_id: 5 });
        assert!(!evaluator.check(&check(2, "edit_product", Some(99))).await.unwrap());
    }

    #[tokio::test]
    async fn test_first_conclusive_group_wins() {
        let source = MemorySource::default()
            .with_capability("edit_product", false)
            .group(3, "edit_product", TargetScope::All, false, false)
            .group(4, "edit_product", TargetScope::All, false, true)
            .group(8, "edit_product", TargetScope::All, true, false)
            .member(1, 8)
            .member(1, 4)
            .member(1, 3);
        let evaluator = DefaultPolicyEvaluator::new(source);

        let decision = evaluator.decide(&check(1, "edit_product", None)).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.basis, DecisionBasis::Group { group_id: 4 });
    }

    #[tokio::test]
    async fn test_self_scope_allows_unless_subject_denies() {
        let source = MemorySource::default()
            .with_capability("edit_user", false)
            .subject(2, "edit_user", TargetScope::Id(2), false, true);
        let evaluator = DefaultPolicyEvaluator::new(source);

        let own = check(1, "edit_user", Some(1)).self_scoped(true);
        assert_eq!(
            evaluator.decide(&own).await.unwrap().basis,
            DecisionBasis::SelfScope
        );

        let denied = check(2, "edit_user", Some(2)).self_scoped(true);
        assert!(!evaluator.check(&denied).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_capability_is_not_found_even_when_self_scoped() {
        let evaluator = DefaultPolicyEvaluator::new(MemorySource::default());
        let request = check(1, "no_such_capability", Some(1)).self_scoped(true);

        let err = evaluator.check(&request).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let source = MemorySource {
            unreachable: true,
            ..MemorySource::default()
        };
        let evaluator = DefaultPolicyEvaluator::new(source);

        let err = evaluator.check(&check(1, "view_products", None)).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}
