/*!
 * # Recapper - "previously on" recaps from episode videos
 *
 * Condenses a set of episode videos, each paired with an SRT subtitle file,
 * into one short recap video plus a transcript and a structured scene list.
 *
 * ## Pipeline
 *
 * 1. Subtitle segmentation into sentence units
 * 2. Optional speaker attribution from audio diarization
 * 3. Candidate corpus across all input pairs, in file-name order
 * 4. Summarizer-driven selection under a duration budget
 * 5. Clip extraction with fades, concatenation and render
 * 6. Progress record and run log for polling clients
 *
 * ## Architecture
 *
 * - `app_config`: Configuration management
 * - `subtitle_processor`: SRT parsing and sentence segmentation
 * - `providers`: Summarizer and diarizer capabilities:
 *   - `providers::extractive`: built-in term-frequency summarizer
 *   - `providers::ollama`: Ollama-backed summarizer
 *   - `providers::diarization`: HTTP diarization client
 * - `media`: ffmpeg/ffprobe backend
 * - `recap`: corpus, selection and timeline assembly
 * - `progress`: progress record, run log, run lock, render timer
 * - `app_controller`: Job runner
 * - `file_utils`: File system operations
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod file_utils;
pub mod media;
pub mod progress;
pub mod providers;
pub mod recap;
pub mod subtitle_processor;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, RunReport};
pub use errors::{AppError, MediaError, ProviderError, RecapError, SubtitleError};
pub use progress::{JobProgress, JobStatus};
pub use recap::{CandidateSegment, RecapScene, SelectedSegment, SpeakerTurn};
pub use subtitle_processor::{SentenceUnit, SubtitleCue};
