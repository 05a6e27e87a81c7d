use warden_core::constants::DEFAULT_REQUIRED_APPROVALS;
use warden_core::types::ApproverId;

/// The configured approver pool (spec §3 Upgrade: "approvers belong to a
/// configured pool of size M >= N"). Read from `UPGRADE_APPROVER_IDS` /
/// `UPGRADE_REQUIRED_APPROVALS` in `warden-node`.
#[derive(Clone, Debug)]
pub struct ApproverPool {
    members: Vec<ApproverId>,
    required: u32,
}

impl ApproverPool {
    pub fn new(members: Vec<ApproverId>, required: u32) -> Self {
        Self { members, required }
    }

    /// `M >= N` default pool: five approvers requiring three (spec §4.4.3).
    pub fn default_pool() -> Self {
        let members = (1..=5)
            .map(|n| ApproverId::from(format!("approver-{n}")))
            .collect();
        Self::new(members, DEFAULT_REQUIRED_APPROVALS)
    }

    pub fn contains(&self, approver: &ApproverId) -> bool {
        self.members.contains(approver)
    }

    pub fn required(&self) -> u32 {
        self.required
    }

    pub fn members(&self) -> &[ApproverId] {
        &self.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_is_three_of_five() {
        let pool = ApproverPool::default_pool();
        assert_eq!(pool.members().len(), 5);
        assert_eq!(pool.required(), 3);
        assert!(pool.contains(&ApproverId::from("approver-1")));
        assert!(!pool.contains(&ApproverId::from("outsider")));
    }
}
