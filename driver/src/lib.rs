// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Lifecycle typestate for anything that goes through a
//! configure -> start -> stop progression — used by `brilter-pipeline` to
//! make it impossible to join a pipeline that was never started, or start
//! one twice.

pub trait Configure {
    type Configuration;
    type Configured: Start;
    type Error;
    fn configure(configuration: Self::Configuration) -> Result<Self::Configured, Self::Error>;
}

pub trait Start {
    type Started: Stop;
    type Error;
    fn start(self) -> Result<Self::Started, Self::Error>;
}

pub trait Stop {
    type Outcome;
    type Error;
    fn stop(self) -> Result<Self::Outcome, Self::Error>;
}
