/// One authorization question: may `actor_id` exercise `capability`,
/// optionally on the resource instance `target`?
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub actor_id: i64,
    pub capability: String,
    pub target: Option<i64>,
    /// The target belongs to the actor (e.g. their own user record).
    pub self_scoped: bool,
}

impl AccessRequest {
    pub fn new(actor_id: i64, capability: impl Into<String>) -> Self {
        Self {
            actor_id,
            capability: capability.into(),
            target: None,
            self_scoped: false,
        }
    }

    pub fn on(mut self, target: i64) -> Self {
        self.target = Some(target);
        self
    }

    pub fn on_optional(mut self, target: Option<i64>) -> Self {
        self.target = target;
        self
    }

    pub fn self_scoped(mut self, self_scoped: bool) -> Self {
        self.self_scoped = self_scoped;
        self
    }
}
