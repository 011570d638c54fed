//! Static role / permission catalog seeded into the store at startup.

pub const CHANNEL_MANAGEMENT: &str = "channel management";
pub const THREAD_MANAGEMENT: &str = "thread management";
pub const USER_BLOCK: &str = "user block";
pub const ROLE_MANAGEMENT: &str = "role management";

pub const SUPER_ADMIN: &str = "super admin";
pub const ADMIN: &str = "admin";
pub const USER: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub permissions: Vec<String>,
    pub roles: Vec<RoleGrant>,
}

/// Rows actually inserted by one seeding run. A repeated run reports zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub roles_created: usize,
    pub permissions_created: usize,
}

impl RoleGrant {
    fn new(role: &str, permissions: &[&str]) -> Self {
        Self {
            role: role.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            permissions: [CHANNEL_MANAGEMENT, THREAD_MANAGEMENT, USER_BLOCK, ROLE_MANAGEMENT]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            roles: vec![
                RoleGrant::new(
                    SUPER_ADMIN,
                    &[CHANNEL_MANAGEMENT, THREAD_MANAGEMENT, USER_BLOCK, ROLE_MANAGEMENT],
                ),
                RoleGrant::new(ADMIN, &[CHANNEL_MANAGEMENT, THREAD_MANAGEMENT]),
                RoleGrant::new(USER, &[]),
            ],
        }
    }
}
