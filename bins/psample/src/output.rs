//! Text and JSON rendering of psample events.

use std::ffi::CStr;
use std::io::{self, Write};

use psample::netlink::genl::psample::PsampleCmd;
use psample::{ConfigRecord, GroupDescriptor, OwnedEvent, SampleRecord};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print one event as a single line.
pub fn print_event<W: Write>(
    w: &mut W,
    event: &OwnedEvent,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut *w, event)?;
            writeln!(w)
        }
        OutputFormat::Text => match event {
            OwnedEvent::Sample(sample) => writeln!(w, "{}", sample_line(sample, ifname)),
            OwnedEvent::Config(config) => writeln!(w, "{}", config_line(config)),
        },
    }
}

/// Print the group list.
pub fn print_groups<W: Write>(
    w: &mut W,
    groups: &[GroupDescriptor],
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *w, groups)?;
            writeln!(w)
        }
        OutputFormat::Text => {
            for group in groups {
                writeln!(
                    w,
                    "group {} refcount {} seq {}",
                    group.num, group.refcount, group.seq
                )?;
            }
            Ok(())
        }
    }
}

fn sample_line(sample: &SampleRecord, name: impl Fn(u16) -> String) -> String {
    let mut line = String::from("sample");
    if let Some(group) = sample.group {
        line.push_str(&format!(" group {}", group));
    }
    if let Some(rate) = sample.rate {
        if sample.sample_probability {
            line.push_str(&format!(" probability {}", rate));
        } else {
            line.push_str(&format!(" rate {}", rate));
        }
    }
    if let Some(iif) = sample.iif {
        line.push_str(&format!(" in {}", name(iif)));
    }
    if let Some(oif) = sample.oif {
        line.push_str(&format!(" out {}", name(oif)));
    }
    if let Some(tc) = sample.out_tc {
        line.push_str(&format!(" tc {}", tc));
    }
    if let Some(occ) = sample.out_tc_occ {
        line.push_str(&format!(" occ {}", occ));
    }
    if let Some(latency) = sample.latency {
        line.push_str(&format!(" latency {}ns", latency));
    }
    if let Some(seq) = sample.seq {
        line.push_str(&format!(" seq {}", seq));
    }
    line.push_str(&format!(" len {}", sample.data.len()));
    if let Some(origsize) = sample.origsize {
        line.push_str(&format!("/{}", origsize));
    }
    if let Some(cookie) = &sample.user_cookie {
        line.push_str(" cookie ");
        for b in cookie {
            line.push_str(&format!("{:02x}", b));
        }
    }
    line
}

fn config_line(config: &ConfigRecord) -> String {
    let action = match PsampleCmd::from_u8(config.cmd) {
        Some(PsampleCmd::NewGroup) => "new".to_string(),
        Some(PsampleCmd::DelGroup) => "del".to_string(),
        _ => format!("cmd {}", config.cmd),
    };
    let mut line = format!("{} group", action);
    match config.group {
        Some(group) => line.push_str(&format!(" {}", group)),
        None => line.push_str(" ?"),
    }
    if let Some(refcount) = config.group_refcount {
        line.push_str(&format!(" refcount {}", refcount));
    }
    line
}

/// Interface name for an index, or the number if it is gone.
fn ifname(index: u16) -> String {
    let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
    let ptr = unsafe { libc::if_indextoname(index as libc::c_uint, buf.as_mut_ptr()) };
    if ptr.is_null() {
        return index.to_string();
    }
    unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}
