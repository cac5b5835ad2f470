use crate::types::CanonicalUser;

pub const ROLE_KEY_HEAD_ADMIN: &str = "head_admin";
pub const ROLE_KEY_FACULTY: &str = "faculty";
pub const ROLE_KEY_SUPER_ADMIN: &str = "super_admin";

/// Canonical key for a free-text role as stored on user records.
///
/// Known spellings collapse to `head_admin`, `faculty` or `super_admin`;
/// anything else is lowercased with whitespace runs turned into `_`.
pub fn normalize_role(role: Option<&str>) -> String {
    let role = role.unwrap_or("").trim();
    let compact: String = role
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    match compact.as_str() {
        "headadmin" | "departmenthead" | "depthead" => ROLE_KEY_HEAD_ADMIN.to_string(),
        "faculty" | "facultymember" => ROLE_KEY_FACULTY.to_string(),
        "superadmin" => ROLE_KEY_SUPER_ADMIN.to_string(),
        _ => role.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_"),
    }
}

/// Display label for a stored role.
pub fn pretty_role(role: Option<&str>) -> String {
    match normalize_role(role).as_str() {
        ROLE_KEY_HEAD_ADMIN => "Head Admin".to_string(),
        ROLE_KEY_FACULTY => "Faculty".to_string(),
        ROLE_KEY_SUPER_ADMIN => "Super Admin".to_string(),
        _ => role
            .filter(|r| !r.is_empty())
            .unwrap_or("Unknown")
            .to_string(),
    }
}

/// Registry members shown in pickers and rosters.
pub fn visible_users(users: &[CanonicalUser]) -> Vec<CanonicalUser> {
    users.iter().filter(|u| !u.is_super_admin()).cloned().collect()
}

/// Search box plus role dropdown over the user list.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub query: String,
    /// Role key from [`normalize_role`]; empty means any role.
    pub role: String,
}

impl UserFilter {
    pub fn matches(&self, user: &CanonicalUser) -> bool {
        let role_pass = self.role.is_empty() || normalize_role(user.role.as_deref()) == self.role;

        let q = self.query.trim().to_lowercase();
        let search_pass = q.is_empty() || {
            let name = user.full_name.as_deref().unwrap_or("").to_lowercase();
            let email = user.email.as_deref().unwrap_or("").to_lowercase();
            name.contains(&q) || email.contains(&q)
        };

        role_pass && search_pass
    }

    pub fn apply<'a>(&self, users: &'a [CanonicalUser]) -> Vec<&'a CanonicalUser> {
        users.iter().filter(|u| self.matches(u)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, role: &str, name: &str, email: &str) -> CanonicalUser {
        CanonicalUser {
            id: id.to_string(),
            role: Some(role.to_string()),
            full_name: Some(name.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_role() {
        assert_eq!(normalize_role(Some("Head Admin")), "head_admin");
        assert_eq!(normalize_role(Some("dept-head")), "head_admin");
        assert_eq!(normalize_role(Some(" Faculty Member ")), "faculty");
        assert_eq!(normalize_role(Some("SUPER-ADMIN")), "super_admin");
        assert_eq!(normalize_role(Some("Lab  Technician")), "lab_technician");
        assert_eq!(normalize_role(None), "");
    }

    #[test]
    fn test_pretty_role() {
        assert_eq!(pretty_role(Some("head_admin")), "Head Admin");
        assert_eq!(pretty_role(Some("Registrar")), "Registrar");
        assert_eq!(pretty_role(None), "Unknown");
    }

    #[test]
    fn test_filter_combines_role_and_search() {
        let users = vec![
            user("1", "Head Admin", "Ana Cruz", "ana@x.edu"),
            user("2", "Faculty", "Ben Reyes", "ben@x.edu"),
            user("3", "faculty", "Cora Ana", "cora@x.edu"),
        ];

        let by_role = UserFilter {
            role: "faculty".into(),
            ..Default::default()
        };
        assert_eq!(by_role.apply(&users).len(), 2);

        let both = UserFilter {
            query: " ANA ".into(),
            role: "faculty".into(),
        };
        let hits = both.apply(&users);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "3");

        let by_email = UserFilter {
            query: "ben@".into(),
            ..Default::default()
        };
        assert_eq!(by_email.apply(&users)[0].id, "2");
    }

    #[test]
    fn test_visible_users_hide_super_admins() {
        let users = vec![user("root", "Super Admin", "Root", "r@x.edu"), user("2", "Faculty", "B", "b@x.edu")];
        let visible = visible_users(&users);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "2");
    }
}
