use chrono::{NaiveDate, Utc};

use crate::models::UserRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MemberStatus::Active => "Active",
            MemberStatus::Inactive => "Inactive",
        })
    }
}

#[derive(Debug, Clone)]
pub struct TeamMember {
    pub id: u32,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub bugs_assigned: u32,
    pub bugs_closed: u32,
    pub status: MemberStatus,
    pub join_date: NaiveDate,
}

/// The user-management table. The backend has no team endpoints, so this is
/// client-local state seeded with demo members, exactly as mutable as the
/// screen it backs.
pub struct TeamTable {
    members: Vec<TeamMember>,
    next_id: u32,
}

impl Default for TeamTable {
    fn default() -> Self {
        Self::seeded()
    }
}

impl TeamTable {
    pub fn seeded() -> Self {
        let members = vec![
            TeamMember {
                id: 1,
                name: "Admin User".into(),
                email: "admin@bug.com".into(),
                role: UserRole::Admin,
                bugs_assigned: 0,
                bugs_closed: 0,
                status: MemberStatus::Active,
                join_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            },
            TeamMember {
                id: 2,
                name: "John Developer".into(),
                email: "dev@bug.com".into(),
                role: UserRole::Developer,
                bugs_assigned: 5,
                bugs_closed: 12,
                status: MemberStatus::Active,
                join_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap_or_default(),
            },
            TeamMember {
                id: 3,
                name: "Sarah Reporter".into(),
                email: "reporter@bug.com".into(),
                role: UserRole::Reporter,
                bugs_assigned: 0,
                bugs_closed: 0,
                status: MemberStatus::Active,
                join_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap_or_default(),
            },
        ];
        TeamTable { members, next_id: 4 }
    }

    pub fn members(&self) -> &[TeamMember] {
        &self.members
    }

    pub fn add(&mut self, name: &str, email: &str, role: UserRole) -> Option<&TeamMember> {
        if name.trim().is_empty() || email.trim().is_empty() {
            return None;
        }
        let member = TeamMember {
            id: self.next_id,
            name: name.to_string(),
            email: email.to_string(),
            role,
            bugs_assigned: 0,
            bugs_closed: 0,
            status: MemberStatus::Active,
            join_date: Utc::now().date_naive(),
        };
        self.next_id += 1;
        self.members.push(member);
        self.members.last()
    }

    pub fn edit(&mut self, id: u32, name: &str, email: &str, role: UserRole) -> bool {
        match self.members.iter_mut().find(|m| m.id == id) {
            Some(member) => {
                member.name = name.to_string();
                member.email = email.to_string();
                member.role = role;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.id != id);
        self.members.len() != before
    }

    pub fn toggle_status(&mut self, id: u32) -> Option<MemberStatus> {
        let member = self.members.iter_mut().find(|m| m.id == id)?;
        member.status = match member.status {
            MemberStatus::Active => MemberStatus::Inactive,
            MemberStatus::Inactive => MemberStatus::Active,
        };
        Some(member.status)
    }
}
