/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt::{self, Write as _};
use std::io::{self, Write};

use chrono::Local;
use slog::{Drain, Key, Never, OwnedKVList, Record, Serializer, slog_o};
use slog_scope::GlobalLoggerGuard;

/// Plain line drain: `<time> <LEVEL> k: v, ... <msg> <module(file:line)>`.
pub struct StderrDrain {
    append_code_position: bool,
}

impl StderrDrain {
    pub fn new(append_code_position: bool) -> Self {
        StderrDrain {
            append_code_position,
        }
    }

    fn format(&self, record: &Record, values: &OwnedKVList) -> Result<String, fmt::Error> {
        let mut line = String::with_capacity(256);
        write!(
            line,
            "{} {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
            record.level().as_str()
        )?;

        let mut kv = LineKv(&mut line);
        let _ = slog::KV::serialize(values, record, &mut kv);
        let _ = slog::KV::serialize(&record.kv(), record, &mut kv);

        let msg = record.msg().to_string();
        if msg.is_empty() {
            line.push_str(" ()");
        } else {
            line.push(' ');
            line.push_str(&msg);
        }
        if self.append_code_position {
            match record.file().rsplit_once('/').map(|x| x.1) {
                Some(filename) => {
                    write!(line, " <{}({filename}:{})>", record.module(), record.line())?
                }
                None => write!(line, " <{}>", record.module())?,
            }
        }
        line.push('\n');
        Ok(line)
    }
}

impl Drain for StderrDrain {
    type Ok = ();
    type Err = Never;

    fn log(&self, record: &Record, values: &OwnedKVList) -> Result<Self::Ok, Self::Err> {
        if let Ok(line) = self.format(record, values) {
            let mut stderr = io::stderr().lock();
            let _ = stderr.write_all(line.as_bytes());
            let _ = stderr.flush();
        }
        Ok(())
    }
}

struct LineKv<'a>(&'a mut String);

impl Serializer for LineKv<'_> {
    fn emit_arguments(&mut self, key: Key, value: &fmt::Arguments) -> slog::Result {
        let _ = write!(self.0, " {key}: {value},");
        Ok(())
    }
}

pub fn setup(verbose_level: u8) -> Result<GlobalLoggerGuard, log::SetLoggerError> {
    let drain = StderrDrain::new(true);
    let logger = slog::Logger::root(drain.fuse(), slog_o!());

    let scope_guard = slog_scope::set_global_logger(logger);

    let log_level = match verbose_level {
        0 => log::Level::Warn,
        1 => log::Level::Info,
        2 => log::Level::Debug,
        _ => log::Level::Trace,
    };

    slog_stdlog::init_with_level(log_level)?;
    Ok(scope_guard)
}
