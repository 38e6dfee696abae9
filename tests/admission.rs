#![cfg(not(loom))]
//! Admission behaviour under concurrent callers and around crediting start.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use rstest::{fixture, rstest};
use smb2_flow::{
    AdmissionError,
    Channel,
    ChannelKind,
    CreditConfig,
    command::Command,
    dispatch::Dispatcher,
    request::{Request, RequestState},
};
use smb2_flow_testing::{
    RecordingReconnect,
    Responder,
    ScriptedTransport,
    StaticShare,
    accept_all,
    channel_with,
    grant,
    primary,
    started_channel,
};

#[fixture]
fn channel() -> Arc<Channel> { Arc::new(started_channel(10)) }

#[rstest]
#[case::tiny(1, 1)]
#[case::one_unit(65_536, 65_536)]
#[case::three_units(200_000, 196_608)]
#[case::reserve(1_000_000, 8 * 65_536)]
fn credit_check_clamps_against_current_grant(
    channel: Arc<Channel>,
    #[case] requested: usize,
    #[case] allowed: usize,
) {
    assert_eq!(channel.credit_check(requested), allowed);
}

#[rstest]
#[tokio::test]
async fn multi_credit_write_charges_clamped_length(channel: Arc<Channel>) {
    let mut request = Request::new(Command::WRITE).with_payload_len(200_000);
    let len = request.payload_len();

    let allowed = channel.decrement(&mut request, len).await.expect("admitted");

    assert_eq!(allowed, Some(196_608));
    assert_eq!(request.payload_len(), Some(196_608));
    assert_eq!(request.credit_charge(), 3);
    assert_eq!(request.state(), RequestState::CreditPending);
    assert_eq!(channel.credit_snapshot().credits_granted, 7);
}

#[tokio::test]
async fn bootstrap_sequence_starts_crediting() {
    let channel = channel_with(primary(), Arc::new(RecordingReconnect::default()));

    let mut negotiate = Request::new(Command::NEGOTIATE);
    channel.decrement(&mut negotiate, None).await.expect("negotiate");
    assert_eq!(channel.sequence(&mut negotiate), 0);

    let mut setup = Request::new(Command::SESSION_SETUP);
    channel.decrement(&mut setup, None).await.expect("session setup");
    assert_eq!(setup.credits_requested(), 128);
    assert_eq!(channel.sequence(&mut setup), 1);

    grant(&channel, Command::SESSION_SETUP, 5);
    assert_eq!(channel.credit_snapshot().credits_ss_granted, 5);
    assert_eq!(channel.credit_snapshot().credits_granted, 0);

    channel.start(0);
    let snapshot = channel.credit_snapshot();
    assert!(snapshot.started);
    assert_eq!(snapshot.credits_granted, 5);
    assert_eq!(snapshot.credits_max, 5);
    assert_eq!(snapshot.req_pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_never_overdraw() {
    let channel = Arc::new(started_channel(4));
    let transport = Arc::new(ScriptedTransport::responding(Responder::granting(1)));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&channel), transport, accept_all));

    let tasks = (0..16).map(|_| {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let mut request = Request::new(Command::READ);
            dispatcher.send(&mut request).await.expect("reply");
            assert!(dispatcher.channel().credit_snapshot().credits_granted >= 0);
            request.state()
        })
    });
    let states = tokio::time::timeout(Duration::from_secs(30), join_all(tasks))
        .await
        .expect("admission stalled");
    for state in states {
        assert_eq!(state.expect("task panicked"), RequestState::Completed);
    }

    let snapshot = channel.credit_snapshot();
    assert_eq!(snapshot.credits_granted, 4);
    assert_eq!(snapshot.req_pending, 0);
    assert_eq!(snapshot.credits_wait, 0);
    assert_eq!(channel.next_message_id(), 16);
}

#[tokio::test]
async fn window_closes_on_oldest_outstanding_request() {
    let channel = started_channel(2);
    let mut held = Request::new(Command::READ);
    channel.decrement(&mut held, None).await.expect("first");
    channel.sequence(&mut held);
    grant(&channel, Command::READ, 1);
    let mut second = Request::new(Command::READ);
    channel.decrement(&mut second, None).await.expect("second");
    channel.sequence(&mut second);
    grant(&channel, Command::READ, 1);
    let mut third = Request::new(Command::READ);
    channel.decrement(&mut third, None).await.expect("third");
    channel.sequence(&mut third);

    // Credit remains, but three ids are outstanding against a grant of one.
    assert_eq!(channel.credit_snapshot().credits_granted, 1);
    let mut blocked = Request::new(Command::READ).no_block();
    assert_eq!(
        channel.decrement(&mut blocked, None).await,
        Err(AdmissionError::WouldBlock)
    );

    channel.complete(&mut held, RequestState::Failed);
    channel.complete(&mut second, RequestState::Failed);
    let mut retry = Request::new(Command::READ).no_block();
    channel
        .decrement(&mut retry, None)
        .await
        .expect("window reopened");
}

#[tokio::test(start_paused = true)]
async fn share_teardown_interrupts_wait() {
    let channel = Arc::new(started_channel(0));
    let share = Arc::new(StaticShare::default());
    let waiter = {
        let channel = Arc::clone(&channel);
        let share = Arc::clone(&share);
        tokio::spawn(async move {
            let mut request = Request::new(Command::READ).with_share(share);
            let result = channel.decrement(&mut request, None).await;
            (result, request.state())
        })
    };
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    share.set_going_away(true);

    let (result, state) = waiter.await.expect("waiter panicked");
    assert_eq!(result, Err(AdmissionError::Gone));
    assert_eq!(state, RequestState::Failed);
    assert_eq!(channel.credit_snapshot().credits_granted, 0);
}

#[tokio::test(start_paused = true)]
async fn forced_reconnect_restores_credit_for_waiter() {
    let reconnect = Arc::new(RecordingReconnect::restoring(16));
    let config = CreditConfig::default()
        .wait_tick(Duration::from_millis(100))
        .wait_ticks(5);
    let channel = Arc::new(
        Channel::new(3u64, ChannelKind::Primary, config, reconnect.clone())
            .expect("valid config"),
    );
    channel.start(1);
    let mut hog = Request::new(Command::READ);
    channel.decrement(&mut hog, None).await.expect("hog");

    let mut waiter = Request::new(Command::READ);
    channel.decrement(&mut waiter, None).await.expect("admitted after reconnect");

    assert_eq!(reconnect.count(), 1);
    assert_eq!(channel.credit_snapshot().credits_granted, 15);
    assert_eq!(channel.next_message_id(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_racing_a_new_waiter_is_never_missed() {
    let config = CreditConfig::default().wait_tick(Duration::from_secs(30));
    for _ in 0..64 {
        let reconnect = Arc::new(RecordingReconnect::default());
        let channel = Arc::new(
            Channel::new(9u64, ChannelKind::Primary, config, reconnect).expect("valid config"),
        );
        channel.start(0);
        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move {
                let mut request = Request::new(Command::READ);
                channel.decrement(&mut request, None).await
            })
        };
        let closer = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.shut_down() })
        };

        closer.await.expect("shutdown task panicked");
        let result = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter slept through shutdown")
            .expect("waiter panicked");
        assert_eq!(result, Err(AdmissionError::Gone));
        assert_eq!(channel.credit_snapshot().credits_wait, 0);
    }
}
