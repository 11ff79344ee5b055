//! Static catalog of well-known Flutter packages.
//!
//! Used by the dashboard to offer package choices. Simulation runs accept
//! any package name; unknown names get a placeholder entry.

use serde::Serialize;
use std::collections::BTreeSet;

/// Metadata for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub category: &'static str,
}

const fn pkg(
    name: &'static str,
    version: &'static str,
    description: &'static str,
    category: &'static str,
) -> Package {
    Package { name, version, description, category }
}

const PACKAGES: &[Package] = &[
    pkg("flutter_bloc", "^8.1.3", "State management library", "State Management"),
    pkg("provider", "^6.1.1", "Dependency injection and state management", "State Management"),
    pkg("riverpod", "^2.4.9", "Simple state management", "State Management"),
    pkg("get", "^4.6.6", "High-performance state management", "State Management"),
    pkg("http", "^1.1.2", "HTTP client for Dart", "Networking"),
    pkg("dio", "^5.4.0", "Powerful HTTP client", "Networking"),
    pkg("chopper", "^7.0.8", "HTTP client generator", "Networking"),
    pkg("sqflite", "^2.3.0", "SQLite plugin for Flutter", "Database"),
    pkg("hive", "^2.2.3", "Lightweight NoSQL database", "Database"),
    pkg("shared_preferences", "^2.2.2", "Persistent storage for simple data", "Database"),
    pkg("path_provider", "^2.1.1", "Find commonly used locations", "Database"),
    pkg("flutter_svg", "^2.0.9", "SVG rendering support", "UI Components"),
    pkg("cached_network_image", "^3.3.0", "Image caching", "UI Components"),
    pkg("flutter_staggered_grid_view", "^0.7.0", "Staggered grid layouts", "UI Components"),
    pkg("flutter_slidable", "^3.0.1", "Slidable list items", "UI Components"),
    pkg("go_router", "^12.1.3", "Declarative routing", "Navigation"),
    pkg("auto_route", "^7.9.2", "Code generation based router", "Navigation"),
    pkg("intl", "^0.19.0", "Internationalization and localization", "Utils"),
    pkg("url_launcher", "^6.2.2", "Launch URLs in mobile platform", "Utils"),
    pkg("package_info_plus", "^5.0.1", "Get package information", "Utils"),
    pkg("device_info_plus", "^9.1.1", "Get device information", "Utils"),
    pkg("date_change_checker", "^2.0.2", "Date change detection utility", "Utils"),
    pkg("lottie", "^2.7.0", "Lottie animations", "Animation"),
    pkg("flutter_animate", "^4.3.0", "Animation library", "Animation"),
    pkg("mockito", "^5.4.4", "Mock library for testing", "Testing"),
    pkg("bloc_test", "^9.1.5", "Testing utilities for bloc", "Testing"),
];

const POPULAR: &[&str] = &[
    "flutter_bloc",
    "provider",
    "http",
    "dio",
    "sqflite",
    "shared_preferences",
    "cached_network_image",
    "go_router",
    "intl",
    "url_launcher",
];

pub fn all() -> &'static [Package] {
    PACKAGES
}

pub fn by_name(name: &str) -> Option<&'static Package> {
    PACKAGES.iter().find(|p| p.name == name)
}

/// Catalog entry for `name`, or a placeholder for custom packages.
pub fn lookup(name: &str) -> Package {
    by_name(name).cloned().unwrap_or(Package {
        name: "custom",
        version: "latest",
        description: "Custom Flutter package",
        category: "Unknown",
    })
}

/// Packages in `category` (case-insensitive), in catalog order.
pub fn by_category(category: &str) -> Vec<&'static Package> {
    PACKAGES
        .iter()
        .filter(|p| p.category.eq_ignore_ascii_case(category))
        .collect()
}

/// Distinct categories, sorted.
pub fn categories() -> Vec<&'static str> {
    PACKAGES
        .iter()
        .map(|p| p.category)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn popular() -> Vec<&'static Package> {
    POPULAR.iter().filter_map(|name| by_name(name)).collect()
}
