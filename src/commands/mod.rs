pub(crate) mod install;
pub(crate) mod run;
