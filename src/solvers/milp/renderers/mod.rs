//! Formulation Renderers

pub mod lp;
