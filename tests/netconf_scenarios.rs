//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! End-to-end NETCONF scenarios against a real daemon instance, bound to
//! ephemeral sockets. Each test owns its own daemon and scratch directory.

mod common;

use ncd_netconf::FrameMode;

#[tokio::test]
async fn rpc_before_hello_is_rejected_and_closes_the_session() {
    let test_daemon = common::spawn().await;
    let mut framer = test_daemon.connect_netconf().await;

    let reply = common::exchange(&mut framer, r#"<rpc message-id="1"><get/></rpc>"#).await;
    assert!(reply.contains("<rpc-error>"));
    assert!(reply.contains("<error-tag>operation-failed</error-tag>"));
    assert!(reply.contains("Client must send an hello element before any RPC"));

    let after = framer.read_message().await.expect("read after error reply");
    assert!(after.is_none(), "session should be closed after the error reply");

    test_daemon.shutdown().await;
}

#[tokio::test]
async fn negotiating_base_1_1_upgrades_both_peers_to_chunked_framing() {
    let test_daemon = common::spawn().await;
    let mut framer = test_daemon.connect_netconf().await;

    let hello_reply = common::exchange(&mut framer, common::HELLO_1_1).await;
    assert!(hello_reply.contains("urn:ietf:params:netconf:base:1.1"));

    // The daemon only switches frame mode once it has both read the hello
    // and replied; the client follows the same rule.
    framer.set_mode(FrameMode::Chunked);

    let reply = common::exchange(&mut framer, r#"<rpc message-id="2"><get/></rpc>"#).await;
    assert!(reply.contains("<data"));

    test_daemon.shutdown().await;
}

#[tokio::test]
async fn second_lock_attempt_on_candidate_is_denied() {
    let test_daemon = common::spawn().await;

    let mut first = test_daemon.connect_netconf().await;
    common::exchange(&mut first, common::HELLO_1_0).await;
    let lock_reply = common::exchange(
        &mut first,
        r#"<rpc message-id="1"><lock><target><candidate/></target></lock></rpc>"#,
    )
    .await;
    assert!(lock_reply.contains("<ok/>"));

    let mut second = test_daemon.connect_netconf().await;
    common::exchange(&mut second, common::HELLO_1_0).await;
    let denied_reply = common::exchange(
        &mut second,
        r#"<rpc message-id="1"><lock><target><candidate/></target></lock></rpc>"#,
    )
    .await;
    assert!(denied_reply.contains("<error-tag>lock-denied</error-tag>"));

    test_daemon.shutdown().await;
}

#[tokio::test]
async fn edit_config_then_commit_is_visible_in_running() {
    let test_daemon = common::spawn().await;
    let mut framer = test_daemon.connect_netconf().await;
    common::exchange(&mut framer, common::HELLO_1_0).await;

    let edit_reply = common::exchange(
        &mut framer,
        concat!(
            r#"<rpc message-id="1"><edit-config>"#,
            r#"<target><candidate/></target>"#,
            r#"<config><interfaces><interface><name>eth0</name></interface></interfaces></config>"#,
            r#"</edit-config></rpc>"#,
        ),
    )
    .await;
    assert!(edit_reply.contains("<ok/>"));

    let commit_reply =
        common::exchange(&mut framer, r#"<rpc message-id="2"><commit/></rpc>"#).await;
    assert!(commit_reply.contains("<ok/>"));

    let get_reply = common::exchange(
        &mut framer,
        r#"<rpc message-id="3"><get-config><source><running/></source></get-config></rpc>"#,
    )
    .await;
    assert!(get_reply.contains("eth0"));

    test_daemon.shutdown().await;
}
