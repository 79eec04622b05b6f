//! flyvr drives a closed-loop virtual reality rig for freely walking flies.
//!
//! A camera under the arena finds the fly in every frame, a GRBL motion
//! stage carrying the camera moves to keep the fly centred, and the fly's
//! position in the arena (stage position plus its offset in the frame)
//! drives the viewpoint of a visual stimulus played around it. Stimuli run
//! as a shuffled sequence of trials separated by a plain interleave.
//!
//! Each device gets its own thread ([`worker`]): the stage worker talks to
//! the controller ([`stage`]), the vision worker runs the tracker
//! ([`vision`]), and the main loop in [`rig`] fuses the two ([`fusion`]) and
//! steps the stimulus ([`stim`]). Threads share only whole values through
//! the cells in [`cell`].

#![warn(missing_docs)]
// Doc comments in here become command line help.
#[allow(missing_docs)]
pub mod args;
pub mod cell;
pub mod config;
pub mod error;
pub mod fusion;
pub mod gui;
pub mod input;
pub mod recorder;
pub mod rig;
pub mod stage;
pub mod stim;
pub mod time_manager;
pub mod vision;
pub mod worker;
