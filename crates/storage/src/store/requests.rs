#![forbid(unsafe_code)]

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimRequest {
    pub lock_name: String,
    pub reason: Option<String>,
}
