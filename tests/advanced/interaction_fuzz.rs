#![cfg(feature = "advanced-tests")]
//! Property-based fuzzing of admission, sequencing and reply crediting.
//!
//! Random sequences of non-blocking admissions, replies and failures are
//! applied to one channel while a simple model tracks the credit it should
//! hold. The ledger must agree with the model after every step.

use std::collections::VecDeque;

use proptest::prelude::*;
use smb2_flow::{
    AdmissionError,
    CREDIT_UNIT_SIZE,
    command::Command,
    request::{Request, RequestState},
    response::extract_credits,
};
use smb2_flow_testing::{encode_reply, reply_to, started_channel};

#[derive(Debug, Clone)]
enum Action {
    Admit(Option<usize>),
    Reply(u16),
    Fail,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => prop::option::of(1usize..(8 * CREDIT_UNIT_SIZE)).prop_map(Action::Admit),
        2 => (0u16..6).prop_map(Action::Reply),
        1 => Just(Action::Fail),
    ]
}

fn run_actions(initial: u16, actions: &[Action]) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");
    let channel = started_channel(initial);
    let mut expected_granted = i32::from(initial);
    let mut expected_next_id = 0u64;
    let mut outstanding: VecDeque<Request> = VecDeque::new();

    for act in actions {
        match act {
            Action::Admit(len) => {
                let mut request = Request::new(Command::READ).no_block();
                match runtime.block_on(channel.decrement(&mut request, *len)) {
                    Ok(allowed) => {
                        if let (Some(len), Some(allowed)) = (len, allowed) {
                            prop_assert!(allowed <= *len);
                        }
                        expected_granted -= i32::from(request.credit_charge());
                        prop_assert_eq!(channel.sequence(&mut request), expected_next_id);
                        expected_next_id += u64::from(request.credit_charge().max(1));
                        outstanding.push_back(request);
                    }
                    Err(error) => {
                        prop_assert_eq!(error, AdmissionError::WouldBlock);
                        prop_assert_eq!(request.state(), RequestState::Building);
                    }
                }
            }
            Action::Reply(credits) => {
                let Some(mut request) = outstanding.pop_front() else {
                    continue;
                };
                let header = reply_to(&request.header(), *credits);
                extract_credits(&channel, &mut request, &encode_reply(&header, &[]))
                    .map_err(|error| TestCaseError::fail(error.to_string()))?;
                channel.complete(&mut request, RequestState::Failed);
                expected_granted += i32::from(*credits);
            }
            Action::Fail => {
                if let Some(mut request) = outstanding.pop_front() {
                    channel.complete(&mut request, RequestState::Failed);
                }
            }
        }

        let snapshot = channel.credit_snapshot();
        prop_assert!(snapshot.credits_granted >= 0);
        prop_assert_eq!(snapshot.credits_granted, expected_granted);
        prop_assert_eq!(snapshot.req_pending as usize, outstanding.len());
        prop_assert_eq!(snapshot.credits_wait, 0);
        prop_assert_eq!(channel.next_message_id(), expected_next_id);
        if let Some(oldest) = outstanding.front() {
            prop_assert_eq!(snapshot.oldest_message_id, oldest.message_id());
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn ledger_matches_model(
        initial in 0u16..16,
        actions in prop::collection::vec(action(), 1..64),
    ) {
        run_actions(initial, &actions)?;
    }
}
