//! Group filter binding tests.

use std::ops::ControlFlow;

use psample::netlink::genl::psample::PsampleCmd;
use psample::{GroupFilter, Handlers, Mode};

use crate::common::{self, config, sample};

#[test]
fn test_bind_group_installs_filter() {
    let (mut session, event, _control) = common::open_session();

    session.bind_group(7).unwrap();

    assert_eq!(session.filter().map(GroupFilter::group), Some(7));
    let state = event.state();
    assert_eq!(state.attaches, 1);
    assert_eq!(state.detaches, 0);
    assert_eq!(state.filter.as_deref(), Some(GroupFilter::new(7).program()));
}

#[test]
fn test_rebind_detaches_then_attaches() {
    let (mut session, event, _control) = common::open_session();

    session.bind_group(7).unwrap();
    session.bind_group(8).unwrap();

    {
        let state = event.state();
        assert_eq!(state.attaches, 2);
        assert_eq!(state.detaches, 1);
    }
    assert!(!event.multicast(&sample(7, 1, 1)));
    assert!(event.multicast(&sample(8, 1, 1)));

    let mut groups = Vec::new();
    let mut handlers = Handlers::new().on_sample(|s| {
        groups.push(s.group());
        ControlFlow::<()>::Continue(())
    });
    session.dispatch(&mut handlers, Mode::NonBlocking).unwrap();
    drop(handlers);
    assert_eq!(groups, vec![8]);
}

#[test]
fn test_filter_passes_messages_without_group() {
    let (mut session, event, _control) = common::open_session();
    session.bind_group(3).unwrap();

    let groupless = common::psample_msg(PsampleCmd::NewGroup, 0, |_| {});
    assert!(event.multicast(&groupless));
    assert!(event.multicast(&config(PsampleCmd::DelGroup, 3)));
    assert!(!event.multicast(&config(PsampleCmd::DelGroup, 4)));
}

#[test]
fn test_detach_failure_keeps_previous_filter() {
    let (mut session, event, _control) = common::open_session();
    session.bind_group(7).unwrap();
    event.state().fail_detach = true;

    let err = session.bind_group(8).unwrap_err();

    assert_eq!(err.errno(), Some(libc::EBADF));
    assert_eq!(session.filter().map(GroupFilter::group), Some(7));
    assert_eq!(event.state().attaches, 1);
    assert!(event.multicast(&sample(7, 1, 1)));

    // Let teardown succeed.
    event.state().fail_detach = false;
}

#[test]
fn test_attach_failure_leaves_no_filter() {
    let (mut session, event, _control) = common::open_session();
    session.bind_group(7).unwrap();
    event.state().fail_attach = true;

    let err = session.bind_group(8).unwrap_err();

    assert_eq!(err.errno(), Some(libc::ENOMEM));
    assert!(session.filter().is_none());
    let state = event.state();
    assert_eq!(state.detaches, 1);
    assert!(state.filter.is_none());
}
