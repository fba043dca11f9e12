//! Client route table.
//!
//! Maps URL paths to views. Patterns use `:name` for a required segment and
//! `:name?` for an optional trailing one; a trailing slash is tolerated.

use std::collections::BTreeMap;

use regex::Regex;

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum View {
    Login,
    Home,
    Chat,
    Scores,
    Profile,
    Countries,
    Vote,
}

/// Default phase shown by the countries view.
pub const DEFAULT_PHASE: &str = "semi1";

#[derive(Clone, Debug)]
pub struct RouteDef {
    pub pattern: String,
    pub name: Option<&'static str>,
    pub view: View,
    pub defaults: Vec<(&'static str, &'static str)>,
}

impl RouteDef {
    pub fn new(pattern: impl Into<String>, view: View) -> Self {
        Self {
            pattern: pattern.into(),
            name: None,
            view,
            defaults: Vec::new(),
        }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_default(mut self, param: &'static str, value: &'static str) -> Self {
        self.defaults.push((param, value));
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteMatch {
    pub view: View,
    pub name: Option<&'static str>,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug)]
struct CompiledRoute {
    def: RouteDef,
    regex: Regex,
    params: Vec<String>,
}

#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    pub fn new(defs: Vec<RouteDef>) -> Result<Self> {
        let routes = defs
            .into_iter()
            .map(compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { routes })
    }

    /// The Eurovision client's routes, with the chat view mounted at `chat_path`.
    ///
    /// Fails when an earlier route already claims `chat_path`, since the chat
    /// view would then be unreachable.
    pub fn eurovision(chat_path: &str) -> Result<Self> {
        let table = Self::new(vec![
            RouteDef::new("/", View::Login),
            RouteDef::new("/home", View::Home),
            RouteDef::new(chat_path, View::Chat).named("chat"),
            RouteDef::new("/scores", View::Scores).named("scores"),
            RouteDef::new("/profile", View::Profile).named("profile"),
            RouteDef::new("/countries/:phase?", View::Countries)
                .named("countries")
                .with_default("phase", DEFAULT_PHASE),
            RouteDef::new("/vote/:phase/:countryId", View::Vote).named("VotingPage"),
        ])?;
        match table.view_of(chat_path) {
            Some(View::Chat) => Ok(table),
            other => Err(Error::Config(format!(
                "chat path {chat_path} is already taken by {other:?}"
            ))),
        }
    }

    /// First route matching `path`; query string and fragment are ignored.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let path = strip_query(path);
        let path = if path.is_empty() { "/" } else { path };

        self.routes.iter().find_map(|route| {
            let caps = route.regex.captures(path)?;
            let mut params = BTreeMap::new();
            for (idx, name) in route.params.iter().enumerate() {
                if let Some(m) = caps.get(idx + 1) {
                    params.insert(name.clone(), m.as_str().to_string());
                }
            }
            for (name, value) in &route.def.defaults {
                params
                    .entry(name.to_string())
                    .or_insert_with(|| value.to_string());
            }
            Some(RouteMatch {
                view: route.def.view,
                name: route.def.name,
                params,
            })
        })
    }

    pub fn view_of(&self, path: &str) -> Option<View> {
        self.resolve(path).map(|m| m.view)
    }

    pub fn is_view(&self, path: &str, view: View) -> bool {
        self.view_of(path) == Some(view)
    }
}

fn strip_query(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

fn compile(def: RouteDef) -> Result<CompiledRoute> {
    if !def.pattern.starts_with('/') {
        return Err(Error::Config(format!(
            "route pattern must start with '/': {}",
            def.pattern
        )));
    }

    let mut body = String::new();
    let mut params = Vec::new();
    for segment in def.pattern.split('/').filter(|s| !s.is_empty()) {
        if let Some(param) = segment.strip_prefix(':') {
            if let Some(optional) = param.strip_suffix('?') {
                params.push(optional.to_string());
                body.push_str("(?:/([^/]+))?");
            } else {
                params.push(param.to_string());
                body.push_str("/([^/]+)");
            }
        } else {
            body.push('/');
            body.push_str(&regex::escape(segment));
        }
    }

    let regex = Regex::new(&format!("^{body}/?$"))
        .map_err(|e| Error::Config(format!("invalid route pattern {}: {e}", def.pattern)))?;

    Ok(CompiledRoute { def, regex, params })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::eurovision("/chat").unwrap()
    }

    #[test]
    fn resolves_static_views() {
        let t = table();
        assert_eq!(t.view_of("/"), Some(View::Login));
        assert_eq!(t.view_of(""), Some(View::Login));
        assert_eq!(t.view_of("/home"), Some(View::Home));
        assert_eq!(t.view_of("/chat"), Some(View::Chat));
        assert_eq!(t.view_of("/chat/"), Some(View::Chat));
        assert_eq!(t.view_of("/chat?from=home#bottom"), Some(View::Chat));
        assert_eq!(t.view_of("/scores"), Some(View::Scores));
        assert_eq!(t.view_of("/profile"), Some(View::Profile));
        assert_eq!(t.view_of("/chatroom"), None);
        assert_eq!(t.view_of("/nope"), None);
    }

    #[test]
    fn countries_phase_is_optional_with_default() {
        let t = table();
        let m = t.resolve("/countries").unwrap();
        assert_eq!(m.view, View::Countries);
        assert_eq!(m.params.get("phase").map(String::as_str), Some("semi1"));

        let m = t.resolve("/countries/final").unwrap();
        assert_eq!(m.params.get("phase").map(String::as_str), Some("final"));
    }

    #[test]
    fn vote_route_captures_both_params() {
        let m = table().resolve("/vote/semi2/17").unwrap();
        assert_eq!(m.view, View::Vote);
        assert_eq!(m.name, Some("VotingPage"));
        assert_eq!(m.params.get("phase").map(String::as_str), Some("semi2"));
        assert_eq!(m.params.get("countryId").map(String::as_str), Some("17"));

        assert!(table().resolve("/vote/semi2").is_none());
    }

    #[test]
    fn custom_chat_path_moves_the_chat_view() {
        let t = RouteTable::eurovision("/group/chat").unwrap();
        assert!(t.is_view("/group/chat", View::Chat));
        assert!(!t.is_view("/chat", View::Chat));
    }

    #[test]
    fn chat_path_shadowed_by_earlier_route_is_rejected() {
        for path in ["/", "/home", "/home/"] {
            let err = RouteTable::eurovision(path).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{path}");
        }
    }

    #[test]
    fn rejects_relative_patterns() {
        let err = RouteTable::new(vec![RouteDef::new("home", View::Home)]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
