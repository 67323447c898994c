//! In-kernel filter selecting one sampling group.
//!
//! The program looks up `PSAMPLE_ATTR_SAMPLE_GROUP` behind the netlink and
//! GENL headers with the `SKF_AD_NLATTR` extension and compares its value.
//! Messages without the attribute always pass.

use super::PsampleAttr;
use crate::netlink::bpf::{
    BPF_ABS, BPF_IMM, BPF_IND, BPF_JEQ, BPF_JMP, BPF_K, BPF_LD, BPF_LDX, BPF_MISC, BPF_RET,
    BPF_TAX, BPF_W, SKF_AD_NLATTR, SKF_AD_OFF, SockFilter,
};
use crate::netlink::genl::GENL_HDRLEN;
use crate::netlink::message::NLMSG_HDRLEN;

/// Index of the instruction carrying the group immediate.
const GROUP_INSN: usize = 6;

const TEMPLATE: [SockFilter; 9] = [
    SockFilter::stmt(BPF_LD | BPF_IMM, (NLMSG_HDRLEN + GENL_HDRLEN) as u32),
    SockFilter::stmt(BPF_LDX | BPF_IMM, PsampleAttr::SampleGroup as u32),
    SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, (SKF_AD_OFF + SKF_AD_NLATTR) as u32),
    // No group attribute: pass.
    SockFilter::jump(BPF_JMP | BPF_JEQ | BPF_K, 0, 4, 0),
    SockFilter::stmt(BPF_MISC | BPF_TAX, 0),
    SockFilter::stmt(BPF_LD | BPF_W | BPF_IND, 4),
    SockFilter::jump(BPF_JMP | BPF_JEQ | BPF_K, 0, 1, 0),
    // drop
    SockFilter::stmt(BPF_RET | BPF_K, 0),
    // pass
    SockFilter::stmt(BPF_RET | BPF_K, u32::MAX),
];

/// A filter program accepting only samples of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFilter {
    group: u32,
    program: Vec<SockFilter>,
}

impl GroupFilter {
    /// Compile the program for `group`.
    pub fn new(group: u32) -> Self {
        let mut program = TEMPLATE.to_vec();
        // Packet loads are big-endian while the attribute is host order,
        // so compare against the byte-swapped group.
        program[GROUP_INSN].k = u32::from_be(group);
        Self { group, program }
    }

    /// The group this program accepts.
    pub fn group(&self) -> u32 {
        self.group
    }

    /// Instructions, ready for `SO_ATTACH_FILTER`.
    pub fn program(&self) -> &[SockFilter] {
        &self.program
    }
}
