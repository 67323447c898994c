//! pcap capture tests.

use psample::netlink::attr::AttrIter;
use psample::netlink::genl::psample::{COOKED_HDRLEN, CookedHeader, DEFAULT_SNAPLEN};
use psample::netlink::genl::{CtrlAttr, CtrlCmd, GENL_ID_CTRL, GenlMsgHdr};
use psample::netlink::message::{NLM_F_ACK, NLM_F_REQUEST, NlMsgHdr};
use psample::netlink::{MessageBuilder, NLMSG_HDRLEN};
use psample::{Error, PcapSink, Session};
use std::io::Write;

use zerocopy::IntoBytes;

use crate::common::{self, Kernel, PairTransport, SharedBuf, ack, batch, sample};

/// The controller's answer describing the psample family.
fn family_reply(seq: u32) -> Vec<u8> {
    let mut builder = MessageBuilder::new(GENL_ID_CTRL, 0);
    builder.append(&GenlMsgHdr::new(CtrlCmd::NewFamily as u8, 2));
    builder.append_attr_u16(CtrlAttr::FamilyId as u16, common::FAMILY_ID);
    builder.append_attr_str(CtrlAttr::FamilyName as u16, "psample");
    builder.set_seq(seq);
    builder.finish()
}

/// A session capturing into `sink`, with the reflection frame written.
fn capturing_into<W>(sink: PcapSink<W>) -> (Session<PairTransport>, Kernel)
where
    W: Write + Send + 'static,
{
    let (mut session, event, control) = common::open_session();
    control.respond_with(|hdr, _| {
        let seq = hdr.nlmsg_seq;
        vec![batch(&[family_reply(seq), ack(seq)])]
    });
    session.pcap_init_with(sink, DEFAULT_SNAPLEN).unwrap();
    (session, event)
}

/// A session capturing into memory.
fn capturing_session() -> (Session<PairTransport>, Kernel, SharedBuf) {
    let buf = SharedBuf::default();
    let sink = PcapSink::new(buf.clone(), DEFAULT_SNAPLEN).unwrap();
    let (session, event) = capturing_into(sink);
    (session, event, buf)
}

fn payload(frame: &[u8]) -> &[u8] {
    assert_eq!(&frame[..COOKED_HDRLEN], CookedHeader::netlink().as_bytes());
    &frame[COOKED_HDRLEN..]
}

#[test]
fn test_pcap_init_reflects_family() {
    let (mut session, _event, control) = common::open_session();
    control.respond_with(|hdr, _| {
        let seq = hdr.nlmsg_seq;
        vec![batch(&[family_reply(seq), ack(seq)])]
    });
    let buf = SharedBuf::default();
    let sink = PcapSink::new(buf.clone(), DEFAULT_SNAPLEN).unwrap();

    session.pcap_init_with(sink, DEFAULT_SNAPLEN).unwrap();
    assert!(session.is_capturing());

    let state = control.state();
    let request = &state.sent[0];
    let hdr = NlMsgHdr::from_bytes(request).unwrap();
    assert_eq!(hdr.nlmsg_type, GENL_ID_CTRL);
    assert_eq!(hdr.nlmsg_flags, NLM_F_REQUEST | NLM_F_ACK);
    let (genl, attrs) = GenlMsgHdr::split(&request[NLMSG_HDRLEN..]).unwrap();
    assert_eq!(genl.cmd, CtrlCmd::GetFamily as u8);
    let attrs: Vec<_> = AttrIter::new(attrs).collect();
    assert_eq!(
        attrs,
        vec![(CtrlAttr::FamilyId as u16, &common::FAMILY_ID.to_ne_bytes()[..])]
    );

    let frames = buf.frames();
    assert_eq!(frames.len(), 1);
    let reply = batch(&[family_reply(hdr.nlmsg_seq), ack(hdr.nlmsg_seq)]);
    assert_eq!(payload(&frames[0].data), &reply[..]);
    assert_eq!(frames[0].orig_len as usize, COOKED_HDRLEN + reply.len());
}

#[test]
fn test_write_pcap_dispatch_until_hang_up() {
    let (mut session, event, buf) = capturing_session();
    let first = sample(1, 10, 2);
    let second = batch(&[sample(2, 10, 2), sample(3, 10, 2)]);
    event.deliver(&first);
    event.deliver(&second);
    event.hang_up();

    session.write_pcap_dispatch().unwrap();
    session.pcap_fini().unwrap();

    let frames = buf.frames();
    assert_eq!(frames.len(), 3);
    assert_eq!(payload(&frames[1].data), &first[..]);
    assert_eq!(payload(&frames[2].data), &second[..]);
    assert!(frames[2].timestamp >= frames[1].timestamp);
    assert!(!session.is_capturing());
}

#[test]
fn test_capture_truncates_large_datagram() {
    let (mut session, event, buf) = capturing_session();
    let big = vec![0xab; 70000];
    event.deliver(&big);
    event.hang_up();

    session.write_pcap_dispatch().unwrap();

    let frames = buf.frames();
    let frame = &frames[1];
    assert_eq!(frame.data.len(), DEFAULT_SNAPLEN as usize);
    assert_eq!(frame.orig_len, DEFAULT_SNAPLEN);
    assert_eq!(payload(&frame.data).len(), DEFAULT_SNAPLEN as usize - COOKED_HDRLEN);
    assert!(payload(&frame.data).iter().all(|&b| b == 0xab));
}

#[test]
fn test_capture_not_initialized() {
    let (mut session, _event, _control) = common::open_session();

    assert!(matches!(
        session.write_pcap_dispatch(),
        Err(Error::CaptureNotInitialized)
    ));
    assert!(matches!(session.pcap_fini(), Err(Error::CaptureNotInitialized)));
}

#[test]
fn test_pcap_init_failure_leaves_no_capture() {
    let (mut session, _event, control) = common::open_session();
    control.respond_with(|hdr, _| vec![common::error(hdr.nlmsg_seq, libc::EPERM)]);

    let sink = PcapSink::new(SharedBuf::default(), DEFAULT_SNAPLEN).unwrap();
    let err = session.pcap_init_with(sink, DEFAULT_SNAPLEN).unwrap_err();

    assert!(err.is_permission_denied());
    assert!(!session.is_capturing());
}

#[test]
fn test_pcap_init_rejects_tiny_snaplen() {
    let (mut session, _event, control) = common::open_session();

    let sink = PcapSink::new(SharedBuf::default(), 16).unwrap();
    let err = session.pcap_init_with(sink, 16).unwrap_err();

    assert!(matches!(err, Error::Capture(_)));
    assert!(control.state().sent.is_empty());
}

#[test]
fn test_pcap_init_twice() {
    let (mut session, _event, buf) = capturing_session();

    let sink = PcapSink::new(SharedBuf::default(), DEFAULT_SNAPLEN).unwrap();
    let err = session.pcap_init_with(sink, DEFAULT_SNAPLEN).unwrap_err();

    assert!(matches!(err, Error::CaptureAlreadyInitialized));
    assert!(session.is_capturing());
    assert_eq!(buf.frames().len(), 1);
}

#[test]
fn test_pcap_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("psample.pcap");
    let sink = PcapSink::create(&path, DEFAULT_SNAPLEN).unwrap();
    drop(sink);

    let bytes = std::fs::read(&path).unwrap();
    let reader = pcap_file::pcap::PcapReader::new(&bytes[..]).unwrap();
    assert_eq!(reader.header().datalink, pcap_file::DataLink::NETLINK);
}

#[test]
fn test_frames_on_disk_before_fini() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live.pcap");
    let (mut session, event) = capturing_into(PcapSink::create(&path, DEFAULT_SNAPLEN).unwrap());
    let datagram = sample(4, 10, 2);
    event.deliver(&datagram);
    event.hang_up();

    session.write_pcap_dispatch().unwrap();
    assert!(session.is_capturing());

    let bytes = std::fs::read(&path).unwrap();
    let mut reader = pcap_file::pcap::PcapReader::new(&bytes[..]).unwrap();
    let mut frames = Vec::new();
    while let Some(packet) = reader.next_packet() {
        frames.push(packet.unwrap().into_owned());
    }
    assert_eq!(frames.len(), 2);
    assert_eq!(payload(&frames[1].data), &datagram[..]);

    session.pcap_fini().unwrap();
}
