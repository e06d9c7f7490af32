use std::sync::Arc;

use async_trait::async_trait;
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};
use tracing::{debug, instrument};

use super::SuccessResponse;
use crate::{
    Error, Result,
    command::{Command, require_card, response_decoder},
    environment::SessionEnvironment,
    session::CardSession,
    types::{Card, UserCode, UserCodeType},
};

/// What to do with one user code
#[derive(Clone, PartialEq, Eq)]
pub enum UserCodeChange {
    /// Leave the code as it is
    Keep,
    /// Set the code to this value
    Value(String),
    /// Ask the user for the new value
    Request,
}

impl std::fmt::Debug for UserCodeChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keep => f.write_str("Keep"),
            Self::Value(_) => f.write_str("Value(***)"),
            Self::Request => f.write_str("Request"),
        }
    }
}

/// Changes or resets the access code and passcode
///
/// The card receives the current codes and the new ones together; a code
/// that is kept is sent again unchanged.
#[derive(Debug, Clone)]
pub struct SetUserCodeCommand {
    access_code: UserCodeChange,
    passcode: UserCodeChange,
    allow_default: bool,
    new_access_code: Option<UserCode>,
    new_passcode: Option<UserCode>,
}

impl SetUserCodeCommand {
    fn with_changes(access_code: UserCodeChange, passcode: UserCodeChange) -> Self {
        Self {
            access_code,
            passcode,
            allow_default: false,
            new_access_code: None,
            new_passcode: None,
        }
    }

    /// Change the access code, asking the user when `code` is `None`
    pub fn change_access_code(code: Option<String>) -> Self {
        Self::with_changes(
            code.map_or(UserCodeChange::Request, UserCodeChange::Value),
            UserCodeChange::Keep,
        )
    }

    /// Change the passcode, asking the user when `code` is `None`
    pub fn change_passcode(code: Option<String>) -> Self {
        Self::with_changes(
            UserCodeChange::Keep,
            code.map_or(UserCodeChange::Request, UserCodeChange::Value),
        )
    }

    /// Change both codes
    pub const fn change(access_code: UserCodeChange, passcode: UserCodeChange) -> Self {
        Self {
            access_code,
            passcode,
            allow_default: false,
            new_access_code: None,
            new_passcode: None,
        }
    }

    /// Restore the factory access code
    pub fn reset_access_code() -> Self {
        let mut command = Self::change_access_code(Some(
            UserCodeType::AccessCode.default_value().to_owned(),
        ));
        command.allow_default = true;
        command
    }

    /// Restore the factory passcode
    pub fn reset_passcode() -> Self {
        let mut command =
            Self::change_passcode(Some(UserCodeType::Passcode.default_value().to_owned()));
        command.allow_default = true;
        command
    }

    /// Restore both factory codes
    pub fn reset_user_codes() -> Self {
        let mut command = Self::change(
            UserCodeChange::Value(UserCodeType::AccessCode.default_value().to_owned()),
            UserCodeChange::Value(UserCodeType::Passcode.default_value().to_owned()),
        );
        command.allow_default = true;
        command
    }

    const fn change_for(&self, kind: UserCodeType) -> &UserCodeChange {
        match kind {
            UserCodeType::AccessCode => &self.access_code,
            UserCodeType::Passcode => &self.passcode,
        }
    }

    fn new_code_hash(
        &self,
        environment: &SessionEnvironment,
        kind: UserCodeType,
    ) -> Option<Vec<u8>> {
        let new = match kind {
            UserCodeType::AccessCode => &self.new_access_code,
            UserCodeType::Passcode => &self.new_passcode,
        };
        new.as_ref()
            .unwrap_or_else(|| environment.user_code(kind))
            .value()
            .map(|hash| hash.to_vec())
    }

    async fn resolve(
        &self,
        session: &mut CardSession,
        kind: UserCodeType,
    ) -> Result<Option<UserCode>> {
        let value = match self.change_for(kind) {
            UserCodeChange::Keep => return Ok(None),
            UserCodeChange::Value(value) => value.clone(),
            UserCodeChange::Request => {
                let cancel = session.cancel_handle();
                let delegate = Arc::clone(session.delegate());
                let environment = session.environment();
                let card_id = environment
                    .card_id()
                    .and_then(|id| environment.config.card_id_display_format.format(id));
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::UserCancelled),
                    code = delegate.request_user_code(kind, true, card_id.as_deref()) => {
                        code.ok_or(Error::UserCancelled)?
                    }
                }
            }
        };

        if value.is_empty() {
            return Err(Error::SerializeCommandError(format!("empty {kind}")));
        }
        if !self.allow_default && value == kind.default_value() {
            return Err(match kind {
                UserCodeType::AccessCode => Error::AccessCodeCannotBeDefault,
                UserCodeType::Passcode => Error::PasscodeCannotBeChanged,
            });
        }
        Ok(Some(UserCode::new(kind, &value)))
    }
}

#[async_trait]
impl Command for SetUserCodeCommand {
    type Response = SuccessResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if self.access_code != UserCodeChange::Keep {
            if !card.settings.is_setting_access_code_allowed() {
                return Err(Error::AccessCodeCannotBeChanged);
            }
            let to_default = matches!(&self.access_code, UserCodeChange::Value(v)
                if v == UserCodeType::AccessCode.default_value());
            if to_default && !card.settings.is_removing_access_code_allowed() {
                return Err(Error::AccessCodeCannotBeDefault);
            }
        }
        if self.passcode != UserCodeChange::Keep && !card.settings.is_setting_passcode_allowed() {
            return Err(Error::PasscodeCannotBeChanged);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append_opt(TlvTag::Pin2, environment.passcode_hash())?
            .append(TlvTag::CardId, card.card_id.clone())?
            .append_opt(
                TlvTag::NewPin,
                self.new_code_hash(environment, UserCodeType::AccessCode),
            )?
            .append_opt(
                TlvTag::NewPin2,
                self.new_code_hash(environment, UserCodeType::Passcode),
            )?
            .append_opt(TlvTag::Cvc, environment.cvc.clone())?;
        Ok(CommandApdu::new(Instruction::SetPin, builder.build()))
    }

    fn deserialize(
        &self,
        _environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<SuccessResponse> {
        Ok(SuccessResponse {
            card_id: response_decoder(response)?.decode(TlvTag::CardId)?,
        })
    }

    #[instrument(level = "debug", skip_all)]
    async fn run(&mut self, session: &mut CardSession) -> Result<SuccessResponse> {
        self.new_access_code = self.resolve(session, UserCodeType::AccessCode).await?;
        self.new_passcode = self.resolve(session, UserCodeType::Passcode).await?;

        let response = session.transceive(&*self).await?;

        let environment = session.environment_mut();
        for code in [self.new_access_code.take(), self.new_passcode.take()]
            .into_iter()
            .flatten()
        {
            let kind = code.kind();
            let is_set = !code.is_default();
            debug!(%kind, is_set, "User code changed");
            if let Some(card) = environment.card.as_mut() {
                match kind {
                    UserCodeType::AccessCode => card.is_access_code_set = Some(is_set),
                    UserCodeType::Passcode => card.is_passcode_set = Some(is_set),
                }
            }
            environment.set_user_code(code);
        }
        Ok(response)
    }
}
