//! Channel join and message flows.

mod common;

use common::TestServer;
use gossip_proto::{Command, Prefix, Response};

#[tokio::test]
async fn join_flow_sends_topic_and_names() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect");
    alice.register().await.expect("register");

    alice
        .send(Command::JOIN("#x".into(), None))
        .await
        .unwrap();

    // JOIN echo with the user's own prefix.
    let join = alice.recv().await.unwrap();
    assert_eq!(
        join.prefix,
        Some(Prefix::user("alice", "alice", "localhost"))
    );
    assert_eq!(join.command, Command::JOIN("#x".into(), None));

    // Default topic (332), then names (353) and end of names (366).
    let topic = alice.recv().await.unwrap();
    let Command::Response(Response::RPL_TOPIC, params) = &topic.command else {
        panic!("expected 332, got {topic:?}");
    };
    assert_eq!(params[2], "Welcome to #x!");

    let names = alice.recv().await.unwrap();
    let Command::Response(Response::RPL_NAMREPLY, params) = &names.command else {
        panic!("expected 353, got {names:?}");
    };
    // The creator is channel operator.
    assert_eq!(params[3], "@alice");

    let end = alice.recv().await.unwrap();
    assert!(matches!(
        end.command,
        Command::Response(Response::RPL_ENDOFNAMES, _)
    ));
}

#[tokio::test]
async fn channel_privmsg_reaches_everyone_but_the_sender() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect");
    let mut bob = server.connect("bob").await.expect("connect");
    alice.register().await.expect("register alice");
    bob.register().await.expect("register bob");

    alice.join("#x").await.expect("alice join");
    bob.join("#x").await.expect("bob join");

    alice.privmsg("#x", "hello").await.expect("privmsg");

    // Bob receives exactly alice's line.
    let messages = bob
        .recv_until(|msg| matches!(&msg.command, Command::PRIVMSG(_, _)))
        .await
        .expect("bob receives privmsg");
    let msg = messages.last().unwrap();
    assert_eq!(
        msg.to_string(),
        ":alice!alice@localhost PRIVMSG #x :hello"
    );

    // Alice does not see her own message back: the next line she gets
    // after a PING round-trip must be the PONG alone.
    let drained = alice.sync().await.expect("sync");
    assert!(
        drained
            .iter()
            .all(|m| !matches!(&m.command, Command::PRIVMSG(_, _))),
        "alice saw her own message: {drained:?}"
    );
}

#[tokio::test]
async fn members_see_each_other_join() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect");
    let mut bob = server.connect("bob").await.expect("connect");
    alice.register().await.expect("register alice");
    bob.register().await.expect("register bob");

    alice.join("#x").await.expect("alice join");
    bob.join("#x").await.expect("bob join");

    let messages = alice
        .recv_until(|msg| matches!(&msg.command, Command::JOIN(chan, _) if chan == "#x"))
        .await
        .expect("alice sees bob join");
    let join = messages.last().unwrap();
    assert_eq!(join.prefix, Some(Prefix::user("bob", "bob", "localhost")));
}

#[tokio::test]
async fn privmsg_to_missing_targets() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect");
    alice.register().await.expect("register");

    alice.privmsg("nobody", "hi").await.unwrap();
    let msg = alice.recv().await.unwrap();
    assert!(matches!(
        msg.command,
        Command::Response(Response::ERR_NOSUCHNICK, _)
    ));

    alice.privmsg("#nowhere", "hi").await.unwrap();
    let msg = alice.recv().await.unwrap();
    assert!(matches!(
        msg.command,
        Command::Response(Response::ERR_NOSUCHCHANNEL, _)
    ));
}

#[tokio::test]
async fn private_messages_reach_all_of_a_users_sessions() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect");
    let mut bob = server.connect("bob").await.expect("connect");
    alice.register().await.expect("register alice");
    bob.register().await.expect("register bob");

    alice.privmsg("bob", "psst").await.unwrap();
    let messages = bob
        .recv_until(|msg| matches!(&msg.command, Command::PRIVMSG(_, _)))
        .await
        .expect("bob receives dm");
    assert_eq!(
        messages.last().unwrap().to_string(),
        ":alice!alice@localhost PRIVMSG bob :psst"
    );
}

#[tokio::test]
async fn double_join_is_a_noop() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect");
    let mut bob = server.connect("bob").await.expect("connect");
    alice.register().await.expect("register alice");
    bob.register().await.expect("register bob");

    alice.join("#x").await.expect("first join");
    bob.join("#x").await.expect("bob join");
    alice.sync().await.expect("drain");

    // Second JOIN: no membership change, no broadcast, no replies.
    alice.send(Command::JOIN("#x".into(), None)).await.unwrap();
    let lines = alice.sync().await.expect("sync");
    assert_eq!(
        lines.len(),
        1,
        "duplicate JOIN must produce nothing, got {lines:?}"
    );

    // Bob saw nothing either.
    let lines = bob.sync().await.expect("sync");
    assert!(
        lines
            .iter()
            .all(|m| !matches!(&m.command, Command::JOIN(_, _))),
        "bob saw a duplicate JOIN broadcast: {lines:?}"
    );
}

#[tokio::test]
async fn part_broadcasts_and_cleans_up() {
    let server = TestServer::spawn().await.expect("spawn server");
    let mut alice = server.connect("alice").await.expect("connect");
    let mut bob = server.connect("bob").await.expect("connect");
    alice.register().await.expect("register alice");
    bob.register().await.expect("register bob");

    alice.join("#x").await.expect("alice join");
    bob.join("#x").await.expect("bob join");

    bob.send(Command::PART("#x".into(), Some("off".into())))
        .await
        .unwrap();

    let messages = alice
        .recv_until(|msg| matches!(&msg.command, Command::PART(chan, _) if chan == "#x"))
        .await
        .expect("alice sees part");
    assert_eq!(
        messages.last().unwrap().to_string(),
        ":bob!bob@localhost PART #x :off"
    );

    // Parting a channel bob is no longer on answers 442.
    bob.recv_until(|msg| matches!(&msg.command, Command::PART(_, _)))
        .await
        .expect("bob sees own part");
    bob.send(Command::PART("#x".into(), None)).await.unwrap();
    let msg = bob.recv().await.unwrap();
    assert!(matches!(
        msg.command,
        Command::Response(Response::ERR_NOTONCHANNEL, _)
    ));

    // Parting a channel that never existed answers 403.
    bob.send(Command::PART("#void".into(), None)).await.unwrap();
    let msg = bob.recv().await.unwrap();
    assert!(matches!(
        msg.command,
        Command::Response(Response::ERR_NOSUCHCHANNEL, _)
    ));
}
