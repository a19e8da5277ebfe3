// This file is part of the shakmaty-tbprobe library.
// Copyright (C) 2026 The shakmaty-tbprobe developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Probe endgame tablebases and filter root moves, for chess engines.
//!
//! Tables are found by the material on the board. WDL tables tell if a
//! position is won, drawn or lost under the 50-move rule, and DTZ tables how
//! many plies it takes to the next capture or pawn move on an optimal path.
//! Decoding table files is left to a [`TableLoader`], so that an engine can
//! plug in its own storage. [`MemoryLoader`] synthesises tables from
//! closures.
//!
//! # Examples
//!
//! ```
//! use shakmaty::{fen::Fen, CastlingMode, Chess, Color};
//! use shakmaty_tbprobe::{MemoryLoader, Tablebase, Wdl};
//!
//! let mut loader = MemoryLoader::new();
//! loader.add_wdl("KRvK", |stm, _squares| {
//!     if stm == Color::White { Wdl::Win } else { Wdl::Loss }
//! })?;
//!
//! let tables = Tablebase::new(loader);
//! assert_eq!(tables.max_cardinality(), 3);
//!
//! let pos: Chess = "8/8/8/3k4/2R5/8/8/7K b - - 0 1"
//!     .parse::<Fen>()?
//!     .into_position(CastlingMode::Standard)?;
//!
//! // Black can capture the hanging rook.
//! assert_eq!(tables.probe_wdl(&pos)?.value, Wdl::Draw);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

#![cfg_attr(docs_rs, feature(doc_auto_cfg))]
#![warn(missing_debug_implementations)]

#[macro_use]
mod errors;
mod cache;
mod config;
mod lazy;
mod material;
mod memory;
mod root;
mod table;
mod tablebase;
mod types;

pub use crate::{
    cache::DTZ_ENTRIES,
    config::ProbeConfig,
    errors::{ProbeError, ProbeResult, SyzygyError, SyzygyResult},
    material::{Material, MaterialKey, MaterialSide, ParseMaterialError},
    memory::{MemoryData, MemoryLoader},
    root::{has_repeated, root_moves, RootMove},
    table::{DtzFlags, Pieces, Sides, SubTable, TableData, TableEntry, TableHeader, TableLoader},
    tablebase::Tablebase,
    types::{Dtz, Metric, Probe, ProbeState, Wdl, MAX_PIECES},
};
