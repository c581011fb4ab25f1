/*!
Interactive 2D particle fluid.

The particle solver combines Smoothed Particle Hydrodynamics (density, pressure, viscosity and
optional surface tension) with an iterative penalty/impulse collision pass and a rectangular
boundary clamp. A grid-based "stable fluids" solver is available behind the same [`Solver`] handle.
*/

pub mod simulation;

pub use simulation::*;
