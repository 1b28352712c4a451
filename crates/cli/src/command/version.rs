// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;

use crate::error::Result;

pub fn run(out: &mut dyn Write) -> Result<()> {
    writeln!(out, "m8ctl")?;
    writeln!(out, "  version     : {}", crate::VERSION)?;
    writeln!(out, "  commit      : {}", crate::COMMIT)?;
    writeln!(out, "  platform    : {}/{}", std::env::consts::OS, std::env::consts::ARCH)?;
    Ok(())
}
