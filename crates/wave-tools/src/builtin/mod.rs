// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod bash;
pub mod delete_file;
pub mod edit_file;
pub mod glob;
pub mod grep;
pub mod list_dir;
pub mod read_file;
pub mod write_file;

// ─── OutputCategory contract tests ───────────────────────────────────────────
//
// Mirrors each builtin's output_category() here so a rename or copy-paste
// error fails loudly at compile/test time rather than silently degrading
// context truncation.
#[cfg(test)]
mod output_category_tests {
    use crate::tool::OutputCategory;
    use crate::Tool;

    #[test]
    fn bash_is_headtail() {
        assert_eq!(
            super::bash::BashTool::default().output_category(),
            OutputCategory::HeadTail
        );
    }

    #[test]
    fn grep_is_matchlist() {
        assert_eq!(super::grep::GrepTool.output_category(), OutputCategory::MatchList);
    }

    #[test]
    fn read_file_is_filecontent() {
        assert_eq!(
            super::read_file::ReadFileTool.output_category(),
            OutputCategory::FileContent
        );
    }

    #[test]
    fn write_is_generic() {
        assert_eq!(
            super::write_file::WriteTool.output_category(),
            OutputCategory::Generic
        );
    }

    #[test]
    fn edit_file_is_generic() {
        assert_eq!(
            super::edit_file::EditFileTool.output_category(),
            OutputCategory::Generic
        );
    }

    #[test]
    fn delete_file_is_generic() {
        assert_eq!(
            super::delete_file::DeleteFileTool.output_category(),
            OutputCategory::Generic
        );
    }

    #[test]
    fn glob_is_generic() {
        assert_eq!(super::glob::GlobTool.output_category(), OutputCategory::Generic);
    }

    #[test]
    fn list_dir_is_generic() {
        assert_eq!(
            super::list_dir::ListDirTool.output_category(),
            OutputCategory::Generic
        );
    }
}
