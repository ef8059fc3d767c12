//! seasonsub - batch subtitle pipeline for TV seasons
//!
//! Pairs each episode's video with its subtitle, translates the subtitle with an
//! LLM provider, syncs it to the audio, fixes right-to-left punctuation and muxes
//! the result into the container.

pub mod cli;
pub mod config;
pub mod episode;
pub mod error;
pub mod media;
pub mod rtl;
pub mod subtitle;
pub mod translate;
pub mod workflow;
