use crate::models::permission::{Grant, TargetScope};

/// What a single permission source says about a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Grant,
    Deny,
    /// No opinion; consult the next source.
    Abstain,
}

impl Verdict {
    pub fn of(grant: &Grant) -> Self {
        if grant.denied {
            Verdict::Deny
        } else if grant.enabled {
            Verdict::Grant
        } else {
            Verdict::Abstain
        }
    }

    pub fn is_conclusive(self) -> bool {
        !matches!(self, Verdict::Abstain)
    }

    /// Resolves one owner's rows for a capability against the requested target.
    ///
    /// A row naming the requested target beats an "all" row. A concrete-target
    /// row never applies to an unscoped request. Inert rows are skipped.
    pub fn resolve<'a, I>(rows: I, target: Option<i64>) -> Self
    where
        I: IntoIterator<Item = &'a Grant>,
    {
        let mut general = Verdict::Abstain;

        for row in rows {
            if row.is_inert() {
                continue;
            }

            let verdict = Verdict::of(row);
            if row.target.is_exact(target) {
                return verdict;
            }

            if row.target == TargetScope::All && general != Verdict::Deny {
                general = verdict;
            }
        }

        general
    }
}
