//! Builder defaults. Nothing here is read from files or the environment.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderSettings {
    pub max_forwards: u8,
    /// REGISTER `Expires` when the caller does not pick one.
    pub default_expires: u32,
    pub register_allow: String,
    pub invite_allow: String,
    pub invite_supported: String,
    pub bye_reason: String,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            max_forwards: 70,
            default_expires: 300,
            register_allow: "PRACK, INVITE, ACK, BYE, CANCEL, UPDATE, INFO, SUBSCRIBE, NOTIFY, REFER, MESSAGE, OPTIONS".into(),
            invite_allow: "INVITE, ACK, PRACK, BYE, CANCEL, UPDATE, SUBSCRIBE, NOTIFY, REFER, MESSAGE, OPTIONS".into(),
            invite_supported: "timer, 100rel".into(),
            bye_reason: "Q.850 ;cause=16 ; text=\"Normal call clearing\"".into(),
        }
    }
}
