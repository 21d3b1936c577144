//! Route table and access filtering for the navigation layer.
//!
//! Routes are plain data. Which ones a user sees depends on whether the app
//! is online and on the roles in their [`FamLoginUser`].

use serde::Serialize;

use crate::auth::{FamLoginUser, FamRole, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RouteTarget {
    Page(String),
    Redirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDescription {
    pub id: String,
    pub path: String,
    pub target: RouteTarget,
    pub protected: bool,
    pub is_side_menu: bool,
    /// Roles allowed to open the route. `None` leaves it open to any
    /// signed-in user.
    pub roles: Option<Vec<Role>>,
    pub offline_ready: bool,
    pub offline_only: bool,
    pub children: Option<Vec<RouteDescription>>,
}

impl RouteDescription {
    pub fn new(id: &str, path: &str, target: RouteTarget) -> Self {
        Self {
            id: id.to_string(),
            path: path.to_string(),
            target,
            protected: false,
            is_side_menu: false,
            roles: None,
            offline_ready: false,
            offline_only: false,
            children: None,
        }
    }

    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    pub fn side_menu(mut self) -> Self {
        self.is_side_menu = true;
        self
    }

    pub fn roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn offline_ready(mut self) -> Self {
        self.offline_ready = true;
        self
    }

    pub fn offline_only(mut self) -> Self {
        self.offline_only = true;
        self
    }

    pub fn children(mut self, children: Vec<RouteDescription>) -> Self {
        self.children = Some(children);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub id: String,
    pub path: String,
    pub children: Option<Vec<MenuItem>>,
}

/// Outcome of opening a protected route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Login,
    Unauthorized,
}

fn page(path: &str) -> RouteTarget {
    RouteTarget::Page(path.to_string())
}

fn redirect(path: &str) -> RouteTarget {
    RouteTarget::Redirect(path.to_string())
}

/// Fallback, landing and error routes, in both public and signed-in
/// variants.
pub fn system_routes() -> Vec<RouteDescription> {
    vec![
        RouteDescription::new("Not Found, Redirect", "*", redirect("/")),
        RouteDescription::new("Not Found", "*", page("NotFound")).protected(),
        RouteDescription::new("Dashboard", "/dashboard", redirect("/search")),
        RouteDescription::new("Unauthorized", "/unauthorized", page("RoleError")),
        RouteDescription::new("Unauthorized", "/unauthorized", page("RoleError")).protected(),
        RouteDescription::new("Landing", "/", page("Landing")),
        RouteDescription::new("RedirectWhileLoggedIn", "/", redirect("/dashboard")).protected(),
    ]
}

pub fn app_routes() -> Vec<RouteDescription> {
    vec![RouteDescription::new("Dashboard", "/dashboard", redirect("/search")).protected()]
}

pub fn filter_by_online_status(route: &RouteDescription, is_online: bool) -> bool {
    if route.offline_only {
        return !is_online;
    }
    route.offline_ready || is_online
}

pub fn has_access(route: &RouteDescription, is_online: bool, roles: &[FamRole]) -> bool {
    if !route.protected {
        return true;
    }
    if !filter_by_online_status(route, is_online) {
        return false;
    }
    match &route.roles {
        None => true,
        Some(required) if required.is_empty() => true,
        Some(required) => required
            .iter()
            .any(|role| roles.iter().any(|held| held.role == *role)),
    }
}

/// Drop routes unavailable for the current online status, recursively.
pub fn filter_routes(routes: &[RouteDescription], is_online: bool) -> Vec<RouteDescription> {
    routes
        .iter()
        .filter(|route| filter_by_online_status(route, is_online))
        .map(|route| RouteDescription {
            children: route
                .children
                .as_ref()
                .map(|children| filter_routes(children, is_online)),
            ..route.clone()
        })
        .collect()
}

fn extract_menu_items(routes: &[RouteDescription], is_online: bool, roles: &[FamRole]) -> Vec<MenuItem> {
    routes
        .iter()
        .filter(|route| route.is_side_menu && filter_by_online_status(route, is_online))
        .filter(|route| has_access(route, is_online, roles))
        .map(|route| MenuItem {
            id: route.id.clone(),
            path: route.path.clone(),
            children: route
                .children
                .as_ref()
                .map(|children| extract_menu_items(children, is_online, roles)),
        })
        .collect()
}

pub fn menu_entries(is_online: bool, roles: &[FamRole]) -> Vec<MenuItem> {
    extract_menu_items(&app_routes(), is_online, roles)
}

pub fn public_routes() -> Vec<RouteDescription> {
    let public: Vec<_> = system_routes()
        .into_iter()
        .filter(|route| !route.protected)
        .collect();
    filter_routes(&public, true)
}

pub fn protected_routes(is_online: bool) -> Vec<RouteDescription> {
    let mut routes = filter_routes(&app_routes(), is_online);
    routes.extend(
        system_routes()
            .into_iter()
            .filter(|route| route.id != "Landing" && route.protected),
    );
    routes
}

/// Routes for the current session: public ones when signed out.
pub fn routes_for(user: Option<&FamLoginUser>, is_online: bool) -> Vec<RouteDescription> {
    match user {
        Some(_) => protected_routes(is_online),
        None => public_routes(),
    }
}

pub fn find_route<'a>(routes: &'a [RouteDescription], path: &str) -> Option<&'a RouteDescription> {
    routes.iter().find(|route| route.path == path)
}

/// Decide whether `user` may open a route guarded by `roles`.
pub fn guard(user: Option<&FamLoginUser>, roles: Option<&[Role]>) -> RouteDecision {
    let Some(user) = user else {
        return RouteDecision::Login;
    };
    match roles {
        Some(required) if !required.iter().any(|role| user.roles.iter().any(|held| held.role == *role)) => {
            RouteDecision::Unauthorized
        }
        _ => RouteDecision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(roles: &[Role]) -> Vec<FamRole> {
        roles
            .iter()
            .map(|role| FamRole {
                role: *role,
                clients: Vec::new(),
            })
            .collect()
    }

    fn user(roles: &[Role]) -> FamLoginUser {
        FamLoginUser {
            roles: held(roles),
            ..FamLoginUser::default()
        }
    }

    fn route() -> RouteDescription {
        RouteDescription::new("Reports", "/reports", page("Reports"))
    }

    #[test]
    fn online_status_filter() {
        assert!(filter_by_online_status(&route(), true));
        assert!(!filter_by_online_status(&route(), false));
        assert!(filter_by_online_status(&route().offline_ready(), false));
        assert!(filter_by_online_status(&route().offline_only(), false));
        assert!(!filter_by_online_status(&route().offline_only(), true));
    }

    #[test]
    fn unprotected_routes_are_always_accessible() {
        assert!(has_access(&route().roles(vec![Role::Admin]), false, &[]));
    }

    #[test]
    fn protected_routes_need_a_matching_role() {
        let admin_only = route().protected().roles(vec![Role::Admin]);
        assert!(!has_access(&admin_only, true, &held(&[Role::Viewer])));
        assert!(has_access(&admin_only, true, &held(&[Role::Viewer, Role::Admin])));
        assert!(!has_access(&admin_only, false, &held(&[Role::Admin])));
        assert!(has_access(&route().protected().roles(Vec::new()), true, &[]));
    }

    #[test]
    fn filter_routes_recurses_into_children() {
        let routes = vec![route().children(vec![
            RouteDescription::new("Online", "/reports/online", page("Online")),
            RouteDescription::new("Offline", "/reports/offline", page("Offline")).offline_only(),
        ])];
        let online = filter_routes(&routes, true);
        let children = online[0].children.as_ref().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "Online");
        assert!(filter_routes(&routes, false).is_empty());
    }

    #[test]
    fn menu_items_follow_side_menu_and_roles() {
        let routes = vec![
            route().side_menu().protected().roles(vec![Role::District]).children(vec![
                RouteDescription::new("Hidden", "/reports/hidden", page("Hidden")),
                RouteDescription::new("Shown", "/reports/shown", page("Shown")).side_menu(),
            ]),
            RouteDescription::new("Admin", "/admin", page("Admin"))
                .side_menu()
                .protected()
                .roles(vec![Role::Admin]),
        ];
        let menu = extract_menu_items(&routes, true, &held(&[Role::District]));
        assert_eq!(menu.len(), 1);
        assert_eq!(menu[0].id, "Reports");
        let children = menu[0].children.as_ref().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path, "/reports/shown");
        assert!(menu_entries(true, &[]).is_empty());
    }

    #[test]
    fn public_routes_exclude_protected_variants() {
        let routes = public_routes();
        assert!(routes.iter().all(|route| !route.protected));
        assert_eq!(
            find_route(&routes, "/").map(|route| route.id.as_str()),
            Some("Landing")
        );
    }

    #[test]
    fn protected_routes_drop_landing_and_public_variants() {
        let routes = protected_routes(true);
        assert!(routes.iter().all(|route| route.protected));
        assert!(routes.iter().all(|route| route.id != "Landing"));
        assert_eq!(
            find_route(&routes, "/").map(|route| &route.target),
            Some(&redirect("/dashboard"))
        );
    }

    #[test]
    fn routes_for_depends_on_sign_in() {
        assert_eq!(routes_for(None, true), public_routes());
        assert_eq!(routes_for(Some(&user(&[])), true), protected_routes(true));
    }

    #[test]
    fn guard_decisions() {
        assert_eq!(guard(None, None), RouteDecision::Login);
        assert_eq!(guard(Some(&user(&[])), None), RouteDecision::Allow);
        assert_eq!(
            guard(Some(&user(&[Role::Viewer])), Some(&[Role::Admin][..])),
            RouteDecision::Unauthorized
        );
        assert_eq!(
            guard(Some(&user(&[Role::Admin])), Some(&[Role::Admin, Role::Area][..])),
            RouteDecision::Allow
        );
    }
}
