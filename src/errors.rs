/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use thiserror::Error;

use crate::ast::Location;

#[derive(Error, Debug, PartialEq)]
pub enum AssemblyError {
    #[error("Syntax Error: {0}")]
    PestError(#[from] pest::error::Error<crate::parser::Rule>),

    #[error("Lexical Error at {}: {reason}", loc.render())]
    LexicalError { loc: Location, reason: String },

    #[error("Syntax Error at {}: {reason}", loc.render())]
    SyntaxError { loc: Location, reason: String },

    #[error("Name Error at {}: {reason}", loc.render())]
    NameError { loc: Location, reason: String },

    #[error("Value Error at {}: {reason}", loc.render())]
    ValueError { loc: Location, reason: String },

    #[error("Assertion failed at {}: {reason}", loc.render())]
    AssertionFailure { loc: Location, reason: String },

    #[error("I/O Error at {}: {reason}", loc.render())]
    IOError { loc: Location, reason: String },
}
