use crate::intern::{InternedStr, StringInterner};
use crate::source::SourceLocation;

/// トークン種別
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // === リテラル ===
    /// 整数リテラル
    IntLit(i64),
    /// 符号なし整数リテラル
    UIntLit(u64),
    /// 浮動小数点リテラル
    FloatLit(f64),
    /// 文字リテラル（ワイド文字も値として保持）
    CharLit(u32),
    /// 文字列リテラル
    StringLit(Vec<u8>),

    // === 識別子 ===
    Ident(InternedStr),

    // === キーワード ===
    KwAuto,
    KwBreak,
    KwCase,
    KwChar,
    KwConst,
    KwContinue,
    KwDefault,
    KwDo,
    KwDouble,
    KwElse,
    KwEnum,
    KwExtern,
    KwFloat,
    KwFor,
    KwGoto,
    KwIf,
    KwInline,
    KwInt,
    KwLong,
    KwRegister,
    KwRestrict,
    KwReturn,
    KwShort,
    KwSigned,
    KwSizeof,
    KwStatic,
    KwStruct,
    KwSwitch,
    KwTypedef,
    KwUnion,
    KwUnsigned,
    KwVoid,
    KwVolatile,
    KwWhile,
    KwBool,

    // === 演算子 ===
    Plus,       // +
    Minus,      // -
    Star,       // *
    Slash,      // /
    Percent,    // %
    Amp,        // &
    Pipe,       // |
    Caret,      // ^
    Tilde,      // ~
    LtLt,       // <<
    GtGt,       // >>
    Bang,       // !
    AmpAmp,     // &&
    PipePipe,   // ||
    Lt,         // <
    Gt,         // >
    LtEq,       // <=
    GtEq,       // >=
    EqEq,       // ==
    BangEq,     // !=
    Eq,         // =
    PlusEq,     // +=
    MinusEq,    // -=
    StarEq,     // *=
    SlashEq,    // /=
    PercentEq,  // %=
    AmpEq,      // &=
    PipeEq,     // |=
    CaretEq,    // ^=
    LtLtEq,     // <<=
    GtGtEq,     // >>=
    PlusPlus,   // ++
    MinusMinus, // --
    Question,   // ?
    Colon,      // :
    Arrow,      // ->
    Dot,        // .
    Ellipsis,   // ...

    // === 区切り記号 ===
    Comma,      // ,
    Semi,       // ;
    LParen,     // (
    RParen,     // )
    LBracket,   // [
    RBracket,   // ]
    LBrace,     // {
    RBrace,     // }

    // === プリプロセッサ用 ===
    Hash,       // #
    HashHash,   // ##
    Backslash,  // \

    // === 特殊 ===
    /// ファイル終端
    Eof,
    /// 改行（プリプロセッサ用）
    Newline,
    /// 空白（#define の関数マクロ判定用）
    Space,
}

/// キーワード表（綴り ↔ トークン種別の両方向で使用）
const KEYWORDS: &[(&str, TokenKind)] = &[
    ("auto", TokenKind::KwAuto),
    ("break", TokenKind::KwBreak),
    ("case", TokenKind::KwCase),
    ("char", TokenKind::KwChar),
    ("const", TokenKind::KwConst),
    ("continue", TokenKind::KwContinue),
    ("default", TokenKind::KwDefault),
    ("do", TokenKind::KwDo),
    ("double", TokenKind::KwDouble),
    ("else", TokenKind::KwElse),
    ("enum", TokenKind::KwEnum),
    ("extern", TokenKind::KwExtern),
    ("float", TokenKind::KwFloat),
    ("for", TokenKind::KwFor),
    ("goto", TokenKind::KwGoto),
    ("if", TokenKind::KwIf),
    ("inline", TokenKind::KwInline),
    ("__inline", TokenKind::KwInline),
    ("__inline__", TokenKind::KwInline),
    ("int", TokenKind::KwInt),
    ("long", TokenKind::KwLong),
    ("register", TokenKind::KwRegister),
    ("restrict", TokenKind::KwRestrict),
    ("return", TokenKind::KwReturn),
    ("short", TokenKind::KwShort),
    ("signed", TokenKind::KwSigned),
    ("sizeof", TokenKind::KwSizeof),
    ("static", TokenKind::KwStatic),
    ("struct", TokenKind::KwStruct),
    ("switch", TokenKind::KwSwitch),
    ("typedef", TokenKind::KwTypedef),
    ("union", TokenKind::KwUnion),
    ("unsigned", TokenKind::KwUnsigned),
    ("void", TokenKind::KwVoid),
    ("volatile", TokenKind::KwVolatile),
    ("while", TokenKind::KwWhile),
    ("_Bool", TokenKind::KwBool),
];

impl TokenKind {
    /// キーワード文字列からTokenKindへの変換
    pub fn from_keyword(s: &str) -> Option<TokenKind> {
        KEYWORDS
            .iter()
            .find(|(kw, _)| *kw == s)
            .map(|(_, kind)| kind.clone())
    }

    /// キーワードかどうか
    pub fn is_keyword(&self) -> bool {
        KEYWORDS.iter().any(|(_, kind)| kind == self)
    }

    /// 識別子的なトークンかどうか（識別子またはキーワード）
    ///
    /// 条件トークンの分類に使用する。
    pub fn is_identifier_like(&self) -> bool {
        matches!(self, TokenKind::Ident(_)) || self.is_keyword()
    }

    /// トークンの綴りを文字列として取得
    pub fn spelling(&self, interner: &StringInterner) -> String {
        if let Some((kw, _)) = KEYWORDS.iter().find(|(_, kind)| kind == self) {
            return (*kw).to_string();
        }
        match self {
            TokenKind::Ident(id) => interner.get(*id).to_string(),
            TokenKind::IntLit(n) => n.to_string(),
            TokenKind::UIntLit(n) => format!("{}u", n),
            TokenKind::FloatLit(f) => f.to_string(),
            TokenKind::CharLit(c) => match char::from_u32(*c) {
                Some(ch) if ch.is_ascii_graphic() || ch == ' ' => format!("'{}'", ch),
                _ => format!("'\\x{:02x}'", c),
            },
            TokenKind::StringLit(s) => format!("\"{}\"", String::from_utf8_lossy(s)),
            _ => self.punct_spelling().to_string(),
        }
    }

    /// 演算子・区切り記号の綴り
    fn punct_spelling(&self) -> &'static str {
        match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::LtLt => "<<",
            TokenKind::GtGt => ">>",
            TokenKind::Bang => "!",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::Eq => "=",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::AmpEq => "&=",
            TokenKind::PipeEq => "|=",
            TokenKind::CaretEq => "^=",
            TokenKind::LtLtEq => "<<=",
            TokenKind::GtGtEq => ">>=",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::Arrow => "->",
            TokenKind::Dot => ".",
            TokenKind::Ellipsis => "...",
            TokenKind::Comma => ",",
            TokenKind::Semi => ";",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Hash => "#",
            TokenKind::HashHash => "##",
            TokenKind::Backslash => "\\",
            TokenKind::Newline => "\n",
            TokenKind::Space => " ",
            TokenKind::Eof => "",
            _ => "",
        }
    }
}

/// 位置情報付きトークン
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: SourceLocation,
}

impl Token {
    /// 新しいトークンを作成
    pub fn new(kind: TokenKind, loc: SourceLocation) -> Self {
        Self { kind, loc }
    }

    /// EOFトークンを作成（条件なしスキップの番兵にも使用）
    pub fn eof(loc: SourceLocation) -> Self {
        Self::new(TokenKind::Eof, loc)
    }
}
