//! Group dump tests.

use std::ops::ControlFlow;

use psample::netlink::genl::GenlMsgHdr;
use psample::netlink::genl::psample::{PsampleAttr, PsampleCmd};
use psample::netlink::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NlMsgHdr};
use psample::netlink::NLMSG_HDRLEN;
use psample::{Error, GroupDescriptor};

use crate::common::{self, batch, done, group_record};

#[test]
fn test_groups_collects_records() {
    let (mut session, _event, control) = common::open_session();
    control.respond_with(|hdr, _| {
        let seq = hdr.nlmsg_seq;
        vec![
            batch(&[group_record(seq, 1, 2, 300), group_record(seq, 5, 1, 0)]),
            batch(&[group_record(seq, 9, 4, 17), done(seq)]),
        ]
    });

    let groups = session.groups().unwrap();

    assert_eq!(
        groups,
        vec![
            GroupDescriptor { num: 1, refcount: 2, seq: 300 },
            GroupDescriptor { num: 5, refcount: 1, seq: 0 },
            GroupDescriptor { num: 9, refcount: 4, seq: 17 },
        ]
    );
}

#[test]
fn test_group_dump_request_shape() {
    let (mut session, _event, control) = common::open_session();
    control.respond_with(|hdr, _| vec![done(hdr.nlmsg_seq)]);

    assert!(session.groups().unwrap().is_empty());

    let state = control.state();
    assert_eq!(state.sent.len(), 1);
    let request = &state.sent[0];
    let hdr = NlMsgHdr::from_bytes(request).unwrap();
    assert_eq!(hdr.nlmsg_type, common::FAMILY_ID);
    assert_eq!(hdr.nlmsg_flags, NLM_F_REQUEST | NLM_F_ACK | NLM_F_DUMP);
    assert_eq!(hdr.nlmsg_seq, 1);
    let (genl, attrs) = GenlMsgHdr::split(&request[NLMSG_HDRLEN..]).unwrap();
    assert_eq!(genl.cmd, PsampleCmd::GetGroup as u8);
    assert_eq!(genl.version, 1);
    assert!(attrs.is_empty());
}

#[test]
fn test_group_foreach_break_stops_after_record() {
    let (mut session, _event, control) = common::open_session();
    control.respond_with(|hdr, _| {
        let seq = hdr.nlmsg_seq;
        vec![batch(&[
            group_record(seq, 1, 1, 1),
            group_record(seq, 2, 1, 1),
            group_record(seq, 3, 1, 1),
            done(seq),
        ])]
    });

    let mut seen = Vec::new();
    let flow = session
        .group_foreach(|group| {
            seen.push(group.num);
            if group.num == 2 {
                ControlFlow::Break(group.num)
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();

    assert_eq!(flow, ControlFlow::Break(2));
    assert_eq!(seen, vec![1, 2]);
}

#[test]
fn test_group_dump_skips_foreign_sequence() {
    let (mut session, _event, control) = common::open_session();
    control.respond_with(|hdr, _| {
        let seq = hdr.nlmsg_seq;
        vec![batch(&[
            group_record(seq + 100, 42, 1, 1),
            group_record(seq, 3, 1, 1),
            done(seq),
        ])]
    });

    let groups = session.groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].num, 3);
}

#[test]
fn test_group_record_missing_field_fails() {
    let (mut session, _event, control) = common::open_session();
    control.respond_with(|hdr, _| {
        let seq = hdr.nlmsg_seq;
        let partial = common::psample_msg(PsampleCmd::NewGroup, seq, |b| {
            b.append_attr_u32(PsampleAttr::SampleGroup as u16, 1);
            b.append_attr_u32(PsampleAttr::GroupSeq as u16, 1);
        });
        vec![batch(&[partial, done(seq)])]
    });

    let err = session.groups().unwrap_err();
    assert!(
        matches!(err, Error::MissingAttribute { name } if name == "PSAMPLE_ATTR_GROUP_REFCOUNT")
    );
}

#[test]
fn test_group_dump_kernel_error() {
    let (mut session, _event, control) = common::open_session();
    control.respond_with(|hdr, _| vec![common::error(hdr.nlmsg_seq, libc::EPERM)]);

    let err = session.groups().unwrap_err();
    assert!(err.is_permission_denied());
    assert!(err.to_string().starts_with("dump psample groups"), "{err}");
}

#[test]
fn test_consecutive_dumps_use_new_sequence() {
    let (mut session, _event, control) = common::open_session();
    control.respond_with(|hdr, _| {
        let seq = hdr.nlmsg_seq;
        vec![batch(&[group_record(seq, seq, 1, 1), done(seq)])]
    });

    let first = session.groups().unwrap();
    let second = session.groups().unwrap();

    assert_eq!(first[0].num, 1);
    assert_eq!(second[0].num, 2);
}
