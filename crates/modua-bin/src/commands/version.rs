// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `version` command.

/// Prints version information.
pub fn execute() {
    println!("modua {}", modua_core::VERSION);
    println!("Modbus to OPC UA gateway");
    println!();
    println!("Protocols:");
    println!("  Modbus TCP / RTU-over-TCP / serial RTU (unit ids 1-247)");
    println!("  OPC UA server (None, Basic128Rsa15, Basic256, Basic256Sha256)");
}
