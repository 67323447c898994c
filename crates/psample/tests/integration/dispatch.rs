//! Notification dispatch tests.

use std::ops::ControlFlow;

use psample::netlink::genl::psample::{PsampleAttr, PsampleCmd};
use psample::{Event, Handlers, Mode};

use crate::common::{self, batch, config, sample};

#[test]
fn test_dispatch_sample_end_to_end() {
    let (mut session, event, _control) = common::open_session();
    event.deliver(&sample(7, 100, 2));

    let mut calls = Vec::new();
    let mut handlers = Handlers::new().on_sample(|s| {
        assert!(!s.oif_exist());
        assert!(!s.sample_probability());
        calls.push((s.group(), s.rate(), s.iif(), s.origsize(), s.data().len()));
        ControlFlow::<()>::Continue(())
    });

    let flow = session.dispatch(&mut handlers, Mode::NonBlocking).unwrap();
    drop(handlers);

    assert_eq!(flow, ControlFlow::Continue(()));
    assert_eq!(calls, vec![(7, 100, 2, 64, 32)]);
}

#[test]
fn test_dispatch_without_handlers_drains() {
    let (mut session, event, _control) = common::open_session();
    event.deliver(&sample(1, 1, 1));
    event.deliver(&config(PsampleCmd::NewGroup, 1));

    let mut handlers = Handlers::<()>::new();
    let flow = session.dispatch(&mut handlers, Mode::NonBlocking).unwrap();
    assert_eq!(flow, ControlFlow::Continue(()));

    // Both datagrams are gone.
    let mut seen = 0;
    let mut counting = Handlers::new().on_config(|_| {
        seen += 1;
        ControlFlow::<()>::Continue(())
    });
    session.dispatch(&mut counting, Mode::NonBlocking).unwrap();
    drop(counting);
    assert_eq!(seen, 0);
}

#[test]
fn test_dispatch_empty_queue_is_not_an_error() {
    let (mut session, event, _control) = common::open_session();

    let mut handlers = Handlers::<()>::new().on_sample(|_| panic!("no samples queued"));
    let flow = session.dispatch(&mut handlers, Mode::NonBlocking).unwrap();

    assert_eq!(flow, ControlFlow::Continue(()));
    assert_eq!(event.state().mode, Some(Mode::NonBlocking));
}

#[test]
fn test_dispatch_break_stops_batch() {
    let (mut session, event, _control) = common::open_session();
    event.deliver(&batch(&[sample(1, 1, 1), sample(2, 1, 1), sample(3, 1, 1)]));

    let mut groups = Vec::new();
    let mut handlers = Handlers::new().on_sample(|s| {
        groups.push(s.group());
        if s.group() == 2 {
            ControlFlow::Break(s.group())
        } else {
            ControlFlow::Continue(())
        }
    });

    let flow = session.dispatch(&mut handlers, Mode::NonBlocking).unwrap();
    drop(handlers);

    assert_eq!(flow, ControlFlow::Break(2));
    assert_eq!(groups, vec![1, 2]);
}

#[test]
fn test_blocking_dispatch_takes_one_datagram() {
    let (mut session, event, _control) = common::open_session();
    event.deliver(&sample(1, 1, 1));
    event.deliver(&sample(2, 1, 1));

    let mut groups = Vec::new();
    let mut handlers = Handlers::new().on_sample(|s| {
        groups.push(s.group());
        ControlFlow::<()>::Continue(())
    });

    session.dispatch(&mut handlers, Mode::Blocking).unwrap();
    session.dispatch(&mut handlers, Mode::NonBlocking).unwrap();
    drop(handlers);

    assert_eq!(groups, vec![1, 2]);
}

#[test]
fn test_blocking_dispatch_returns_on_hang_up() {
    let (mut session, event, _control) = common::open_session();
    event.hang_up();

    let mut handlers = Handlers::<()>::new().on_sample(|_| panic!("nothing to sample"));
    let flow = session.dispatch(&mut handlers, Mode::Blocking).unwrap();
    assert_eq!(flow, ControlFlow::Continue(()));
}

#[test]
fn test_malformed_message_fails_and_session_survives() {
    let (mut session, event, _control) = common::open_session();
    let short_iif = common::psample_msg(PsampleCmd::Sample, 0, |b| {
        b.append_attr(PsampleAttr::IifIndex as u16, &[1]);
    });
    event.deliver(&short_iif);
    event.deliver(&sample(5, 1, 1));

    let mut groups = Vec::new();
    let mut handlers = Handlers::new().on_sample(|s| {
        groups.push(s.group());
        ControlFlow::<()>::Continue(())
    });

    let err = session
        .dispatch(&mut handlers, Mode::NonBlocking)
        .unwrap_err();
    assert!(err.is_decode_error(), "{err}");

    session.dispatch(&mut handlers, Mode::NonBlocking).unwrap();
    drop(handlers);
    assert_eq!(groups, vec![5]);
}

#[test]
fn test_kernel_error_is_reported() {
    let (mut session, event, _control) = common::open_session();
    event.deliver(&common::error(0, libc::ENOBUFS));

    let mut handlers = Handlers::<()>::new();
    let err = session
        .dispatch(&mut handlers, Mode::NonBlocking)
        .unwrap_err();
    assert_eq!(err.errno(), Some(libc::ENOBUFS));
}

#[test]
fn test_foreign_family_messages_are_skipped() {
    let (mut session, event, _control) = common::open_session();
    let mut foreign = sample(1, 1, 1);
    // nlmsg_type lives at offset 4.
    foreign[4..6].copy_from_slice(&(common::FAMILY_ID + 1).to_ne_bytes());
    event.deliver(&foreign);

    let mut handlers = Handlers::<()>::new().on_sample(|_| panic!("foreign family"));
    session.dispatch(&mut handlers, Mode::NonBlocking).unwrap();
}

#[test]
fn test_dispatch_events_classifies() {
    let (mut session, event, _control) = common::open_session();
    event.deliver(&batch(&[
        config(PsampleCmd::NewGroup, 4),
        sample(4, 10, 3),
        config(PsampleCmd::DelGroup, 4),
    ]));

    let mut seen = Vec::new();
    session
        .dispatch_events(Mode::NonBlocking, |event| {
            seen.push(match event {
                Event::Sample(s) => format!("sample {}", s.group()),
                Event::Config(c) => format!("{:?} {}", c.command().unwrap(), c.group()),
            });
            ControlFlow::<()>::Continue(())
        })
        .unwrap();

    assert_eq!(seen, vec!["NewGroup 4", "sample 4", "DelGroup 4"]);
}

#[test]
fn test_sample_goes_to_config_handler_without_sample_handler() {
    let (mut session, event, _control) = common::open_session();
    event.deliver(&batch(&[sample(6, 1, 1), config(PsampleCmd::NewGroup, 6)]));

    let mut cmds = Vec::new();
    let mut handlers = Handlers::new().on_config(|c| {
        cmds.push((c.cmd(), c.group()));
        ControlFlow::<()>::Continue(())
    });
    session.dispatch(&mut handlers, Mode::NonBlocking).unwrap();
    drop(handlers);

    assert_eq!(
        cmds,
        vec![
            (PsampleCmd::Sample as u8, 6),
            (PsampleCmd::NewGroup as u8, 6)
        ]
    );
}

#[test]
fn test_config_handler_sees_refcount() {
    let (mut session, event, _control) = common::open_session();
    event.deliver(&config(PsampleCmd::NewGroup, 11));

    let mut refcounts = Vec::new();
    let mut handlers = Handlers::new()
        .on_sample(|_| ControlFlow::<()>::Continue(()))
        .on_config(|c| {
            assert!(!c.group_seq_exist());
            refcounts.push(c.group_refcount());
            ControlFlow::Continue(())
        });
    session.dispatch(&mut handlers, Mode::NonBlocking).unwrap();
    drop(handlers);

    assert_eq!(refcounts, vec![1]);
}
