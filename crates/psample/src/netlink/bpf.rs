//! Classic BPF socket filters.
//!
//! Programs are plain instruction vectors attached to a socket with
//! `SO_ATTACH_FILTER` and removed with `SO_DETACH_FILTER`. [`evaluate`]
//! runs a program against a datagram in user space with the kernel's
//! semantics for the supported opcode subset, including the netlink
//! attribute lookup extension.

use std::io;
use std::os::unix::io::RawFd;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::{NLA_HDRLEN, NLA_TYPE_MASK, nla_align};
use super::error::{Error, Result};

// Instruction classes
pub const BPF_LD: u16 = 0x00;
pub const BPF_LDX: u16 = 0x01;
pub const BPF_JMP: u16 = 0x05;
pub const BPF_RET: u16 = 0x06;
pub const BPF_MISC: u16 = 0x07;

// Load sizes
pub const BPF_W: u16 = 0x00;
pub const BPF_H: u16 = 0x08;
pub const BPF_B: u16 = 0x10;

// Load modes
pub const BPF_IMM: u16 = 0x00;
pub const BPF_ABS: u16 = 0x20;
pub const BPF_IND: u16 = 0x40;

// Jumps
pub const BPF_JA: u16 = 0x00;
pub const BPF_JEQ: u16 = 0x10;
pub const BPF_JGT: u16 = 0x20;
pub const BPF_JGE: u16 = 0x30;
pub const BPF_JSET: u16 = 0x40;

// Operand sources
pub const BPF_K: u16 = 0x00;
pub const BPF_X: u16 = 0x08;
pub const BPF_A: u16 = 0x10;

// Misc operations
pub const BPF_TAX: u16 = 0x00;
pub const BPF_TXA: u16 = 0x80;

/// Base offset of the ancillary data area (`SKF_AD_OFF`).
pub const SKF_AD_OFF: i32 = -0x1000;
/// Ancillary load: find a netlink attribute (`SKF_AD_NLATTR`).
pub const SKF_AD_NLATTR: i32 = 12;

/// Upper bound on program length accepted by the kernel (`BPF_MAXINSNS`).
pub const BPF_MAXINSNS: usize = 4096;

/// One classic BPF instruction (mirrors struct sock_filter).
#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct SockFilter {
    /// Opcode.
    pub code: u16,
    /// Jump offset if true.
    pub jt: u8,
    /// Jump offset if false.
    pub jf: u8,
    /// Generic operand.
    pub k: u32,
}

impl SockFilter {
    /// Non-jump statement (`BPF_STMT`).
    pub const fn stmt(code: u16, k: u32) -> Self {
        Self {
            code,
            jt: 0,
            jf: 0,
            k,
        }
    }

    /// Conditional jump (`BPF_JUMP`).
    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }

    fn class(&self) -> u16 {
        self.code & 0x07
    }
}

/// Attach a program to a socket, replacing any program already attached.
pub fn attach(fd: RawFd, program: &[SockFilter]) -> Result<()> {
    if program.is_empty() || program.len() > BPF_MAXINSNS {
        return Err(Error::Io(io::Error::from_raw_os_error(libc::EINVAL)));
    }

    let fprog = libc::sock_fprog {
        len: program.len() as u16,
        filter: program.as_ptr() as *mut libc::sock_filter,
    };

    // SAFETY: fprog points at `program`, which outlives the call; the kernel
    // copies the instructions before returning. SockFilter has the same
    // repr(C) layout as struct sock_filter.
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ATTACH_FILTER,
            &fprog as *const libc::sock_fprog as *const libc::c_void,
            std::mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Detach the program currently attached to a socket.
///
/// Fails with `ENOENT` when no program is attached.
pub fn detach(fd: RawFd) -> Result<()> {
    let unused: libc::c_int = 0;

    // SAFETY: the kernel ignores the option value for SO_DETACH_FILTER; a
    // valid pointer and length are passed anyway.
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_DETACH_FILTER,
            &unused as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Run `program` against `packet` and return the accepted length.
///
/// Zero means the datagram is dropped. Out-of-bounds loads terminate the
/// program with zero, as in the kernel. Opcodes outside the supported
/// subset (loads, `tax`/`txa`, conditional and unconditional jumps,
/// returns) are reported as an error.
///
/// Used to check filter programs without a kernel; not part of the
/// supported API.
#[doc(hidden)]
pub fn evaluate(program: &[SockFilter], packet: &[u8]) -> Result<u32> {
    let mut a: u32 = 0;
    let mut x: u32 = 0;
    let mut pc = 0usize;

    while pc < program.len() {
        let insn = program[pc];
        pc += 1;

        match insn.class() {
            BPF_LD => {
                let size = insn.code & 0x18;
                let value = match insn.code & 0xe0 {
                    BPF_IMM => Some(insn.k),
                    BPF_ABS => load(packet, insn.k, size, a, x),
                    BPF_IND => load(packet, x.wrapping_add(insn.k), size, a, x),
                    _ => return Err(unsupported(insn)),
                };
                match value {
                    Some(v) => a = v,
                    None => return Ok(0),
                }
            }
            BPF_LDX => match insn.code & 0xe0 {
                BPF_IMM => x = insn.k,
                _ => return Err(unsupported(insn)),
            },
            BPF_MISC => match insn.code & 0xf8 {
                BPF_TAX => x = a,
                BPF_TXA => a = x,
                _ => return Err(unsupported(insn)),
            },
            BPF_JMP => {
                let operand = if insn.code & BPF_X != 0 { x } else { insn.k };
                let op = insn.code & 0xf0;
                if op == BPF_JA {
                    pc += insn.k as usize;
                    continue;
                }
                let taken = match op {
                    BPF_JEQ => a == operand,
                    BPF_JGT => a > operand,
                    BPF_JGE => a >= operand,
                    BPF_JSET => a & operand != 0,
                    _ => return Err(unsupported(insn)),
                };
                let skip = if taken { insn.jt } else { insn.jf };
                pc += skip as usize;
            }
            BPF_RET => {
                return match insn.code & 0x18 {
                    BPF_K => Ok(insn.k),
                    BPF_A => Ok(a),
                    _ => Err(unsupported(insn)),
                };
            }
            _ => return Err(unsupported(insn)),
        }
    }

    Err(Error::InvalidMessage(
        "BPF program ran past its last instruction".into(),
    ))
}

fn unsupported(insn: SockFilter) -> Error {
    Error::InvalidMessage(format!("unsupported BPF opcode {:#06x}", insn.code))
}

/// Packet or ancillary load. `None` aborts the program.
fn load(packet: &[u8], k: u32, size: u16, a: u32, x: u32) -> Option<u32> {
    let ad_base = SKF_AD_OFF as u32;
    if k >= ad_base {
        return match (k - ad_base) as i32 {
            SKF_AD_NLATTR => Some(find_nlattr(packet, a, x)),
            _ => None,
        };
    }

    let off = k as usize;
    let width = match size {
        BPF_W => 4,
        BPF_H => 2,
        BPF_B => 1,
        _ => return None,
    };
    let bytes = packet.get(off..off.checked_add(width)?)?;
    Some(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

/// `SKF_AD_NLATTR`: offset of the first attribute of type `x` in the
/// attribute stream starting at offset `a`, or zero.
fn find_nlattr(packet: &[u8], a: u32, x: u32) -> u32 {
    let mut off = a as usize;
    if packet.len() < NLA_HDRLEN || off > packet.len() - NLA_HDRLEN {
        return 0;
    }

    while off + NLA_HDRLEN <= packet.len() {
        let len = u16::from_ne_bytes([packet[off], packet[off + 1]]) as usize;
        let kind = u16::from_ne_bytes([packet[off + 2], packet[off + 3]]) & NLA_TYPE_MASK;
        if len < NLA_HDRLEN || len > packet.len() - off {
            break;
        }
        if kind as u32 == x {
            return off as u32;
        }
        off += nla_align(len);
    }
    0
}
