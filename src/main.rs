/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use sable::Engine;

fn main() {
    // Attack tables and the KPK bitbase are built once, up front
    sable::init();

    let mut engine = Engine::new();
    println!("{} by {}", engine.name(), env!("CARGO_PKG_AUTHORS").replace(':', ", "));

    if let Err(e) = engine.run() {
        eprintln!("{} encountered a fatal error: {e:#}", engine.name());
    }
}
