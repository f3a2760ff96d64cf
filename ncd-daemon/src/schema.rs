//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Builds the startup self-test schema: a small `ietf-interfaces`-shaped
//! fragment exercised once at boot to confirm the `SchemaContext`/`Tree`
//! wiring works before the daemon starts accepting connections. No `.yang`
//! files are parsed; see `ncd_yang::schema` for why.

use ncd_yang::{SchemaBuilder, SchemaContext, SchemaNodeKind, SchemaType};

pub fn build() -> SchemaContext {
    SchemaBuilder::new()
        .module("ietf-interfaces", Some("2018-02-20"))
        .node(
            "",
            "/ietf-interfaces:interfaces",
            "interfaces",
            "ietf-interfaces",
            SchemaNodeKind::Container,
            None,
        )
        .expect("interfaces container")
        .list_node(
            "/ietf-interfaces:interfaces",
            "/ietf-interfaces:interfaces/interface",
            "interface",
            "ietf-interfaces",
            &["name"],
        )
        .expect("interface list")
        .leaf_node(
            "/ietf-interfaces:interfaces/interface",
            "/ietf-interfaces:interfaces/interface/name",
            "name",
            "ietf-interfaces",
            SchemaType::String,
            true,
            None,
        )
        .expect("interface name leaf")
        .leaf_node(
            "/ietf-interfaces:interfaces/interface",
            "/ietf-interfaces:interfaces/interface/enabled",
            "enabled",
            "ietf-interfaces",
            SchemaType::Boolean,
            false,
            Some("true"),
        )
        .expect("interface enabled leaf")
        .leaf_node(
            "/ietf-interfaces:interfaces/interface",
            "/ietf-interfaces:interfaces/interface/type",
            "type",
            "ietf-interfaces",
            SchemaType::Identity("interface-type".to_owned()),
            true,
            None,
        )
        .expect("interface type leaf")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_test_schema_builds_and_resolves_keys() {
        let ctx = build();
        let list = ctx
            .find("/ietf-interfaces:interfaces/interface")
            .unwrap();
        assert_eq!(list.keys(), ["name".to_owned()]);
        let enabled = ctx
            .find("/ietf-interfaces:interfaces/interface/enabled")
            .unwrap();
        assert_eq!(enabled.default(), Some("true"));
    }
}
