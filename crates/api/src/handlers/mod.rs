pub mod plays;
