//! Domain route helpers.
//!
//! Maintenance mode only supports domains with path based routing and a
//! route for prefix `/` on port 80 or 443.

use serde_json::Value;

fn is_http_port(port: &Value) -> bool {
    matches!(port.get("number").and_then(Value::as_u64), Some(80 | 443))
}

fn is_root_route(route: &Value) -> bool {
    route.get("prefix").and_then(Value::as_str) == Some("/")
}

/// The `/` route of a domain, if it has one.
pub fn find_domain_route(domain: &Value) -> Option<&Value> {
    domain
        .pointer("/spec/ports")?
        .as_array()?
        .iter()
        .find(|port| is_http_port(port))?
        .get("routes")?
        .as_array()?
        .iter()
        .find(|route| is_root_route(route))
}

fn find_domain_route_mut(domain: &mut Value) -> Option<&mut Value> {
    domain
        .pointer_mut("/spec/ports")?
        .as_array_mut()?
        .iter_mut()
        .find(|port| is_http_port(port))?
        .get_mut("routes")?
        .as_array_mut()?
        .iter_mut()
        .find(|route| is_root_route(route))
}

/// Name of the workload the `/` route points at.
pub fn route_workload(domain: &Value) -> Option<&str> {
    find_domain_route(domain)?
        .get("workloadLink")?
        .as_str()?
        .rsplit('/')
        .next()
}

/// Point the `/` route at another workload. Returns `false` if there is no
/// such route.
pub fn set_route_workload(domain: &mut Value, org: &str, gvc: &str, workload: &str) -> bool {
    match find_domain_route_mut(domain) {
        Some(route) => {
            route["workloadLink"] =
                Value::String(format!("/org/{org}/gvc/{gvc}/workload/{workload}"));
            true
        }
        None => false,
    }
}

/// The first domain whose `/` route points at one of `workloads`.
pub fn domain_for<'a>(domains: &'a [Value], workloads: &[String]) -> Option<&'a Value> {
    domains.iter().find(|domain| {
        route_workload(domain).is_some_and(|current| workloads.iter().any(|w| w == current))
    })
}

pub fn domain_name(domain: &Value) -> &str {
    domain.get("name").and_then(Value::as_str).unwrap_or_default()
}
