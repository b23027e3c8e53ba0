/// End-of-sequence ids a model may emit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EosTokenHandler {
    Single(u32),
    Multiple(Vec<u32>),
    None,
}

impl EosTokenHandler {
    pub fn is_eos_token(&self, token_id: u32) -> bool {
        match self {
            EosTokenHandler::Single(id) => token_id == *id,
            EosTokenHandler::Multiple(ids) => ids.contains(&token_id),
            EosTokenHandler::None => false,
        }
    }

    /// Canonical id, used when a single eos id has to be reported.
    pub fn primary(&self) -> Option<u32> {
        match self {
            EosTokenHandler::Single(id) => Some(*id),
            EosTokenHandler::Multiple(ids) => ids.first().copied(),
            EosTokenHandler::None => None,
        }
    }
}
