//! Role-conditioned navigation affordances.
//!
//! Hiding an entry is a usability aid only. Protection of the target route is
//! the job of [`crate::gate`].

use serde::Serialize;

use crate::{Principal, Role, RoleQuery};

/// One navigation entry (menu link or action button).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    pub path: &'static str,
    /// Roles allowed to see the entry. Empty means every signed-in user.
    pub roles: &'static [Role],
}

impl NavItem {
    pub const fn new(label: &'static str, path: &'static str, roles: &'static [Role]) -> Self {
        Self { label, path, roles }
    }

    pub fn is_visible_to<Q: RoleQuery + ?Sized>(&self, roles: &Q) -> bool {
        self.roles.is_empty() || self.roles.iter().any(|r| roles.has_role(r))
    }
}

/// Entries of `items` that the holder of `roles` should be offered.
pub fn visible_items<'a, Q>(items: &'a [NavItem], roles: &Q) -> Vec<&'a NavItem>
where
    Q: RoleQuery + ?Sized,
{
    items.iter().filter(|item| item.is_visible_to(roles)).collect()
}

/// First role in set order, for header/badge display only.
pub fn primary_role(principal: &Principal) -> Option<&Role> {
    principal.roles().iter().next()
}

const OPEN: &[Role] = &[];
const STAFF: &[Role] = &[Role::FACULTY, Role::HOD];
const HOD_ONLY: &[Role] = &[Role::HOD];
const STUDENT_ONLY: &[Role] = &[Role::STUDENT];
const ADMIN_ONLY: &[Role] = &[Role::ADMIN];

static DEFAULT_MENU: &[NavItem] = &[
    NavItem::new("Dashboard", "/dashboard", OPEN),
    NavItem::new("Attendance", "/attendance", OPEN),
    NavItem::new("Mark Attendance", "/attendance/mark", STAFF),
    NavItem::new("Marks", "/marks", OPEN),
    NavItem::new("Enter Marks", "/marks/enter", STAFF),
    NavItem::new("Tasks", "/tasks", OPEN),
    NavItem::new("Create Task", "/tasks/new", STAFF),
    NavItem::new("Submit Task", "/tasks/submit", STUDENT_ONLY),
    NavItem::new("Live Classes", "/live-classes", OPEN),
    NavItem::new("Schedule Live Class", "/live-classes/new", STAFF),
    NavItem::new("Notes", "/notes", OPEN),
    NavItem::new("Upload Notes", "/notes/upload", STAFF),
    NavItem::new("Manage Faculty", "/department/faculty", HOD_ONLY),
    NavItem::new("Department Reports", "/department/reports", HOD_ONLY),
    NavItem::new("Manage Users", "/admin/users", ADMIN_ONLY),
];

/// Navigation of the academic administration UI.
pub fn default_menu() -> &'static [NavItem] {
    DEFAULT_MENU
}
