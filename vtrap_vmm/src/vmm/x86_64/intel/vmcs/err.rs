use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VmxError {
    #[error("VM fail valid")]
    FailValid,
    #[error("VM fail invalid")]
    FailInvalid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure_kind() {
        assert_eq!(VmxError::FailValid.to_string(), "VM fail valid");
        assert_eq!(VmxError::FailInvalid.to_string(), "VM fail invalid");
    }
}
