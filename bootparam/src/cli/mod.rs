/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

pub mod args;
pub mod boot;
pub mod bootconfig;
pub mod cmdline;
pub mod completion;
