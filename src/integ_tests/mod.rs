// SPDX-License-Identifier: Apache-2.0

mod acquire;
mod filter;
mod lifecycle;
mod mock;
mod stateless;
